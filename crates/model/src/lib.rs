pub mod action;
pub mod call;
pub mod dispatch_stretch;
pub mod dispatcher;
pub mod place;
pub mod section;
pub mod track_stretch;
pub mod train;
