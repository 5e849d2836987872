pub mod duration {
    //! Serde support for signed day-durations in `hh:mm:ss` form.
    //! Hours may exceed 24 (a session can run past midnight) and the
    //! whole value may be negative, so this is not a time of day.

    use core::fmt;

    use chrono::Duration;
    use schemars::{
        gen::SchemaGenerator,
        schema::{InstanceType, Schema, SchemaObject},
    };
    use serde::de::Error as DeError;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(duration: Duration) -> String {
        let total_seconds = duration.num_seconds();
        let sign = if total_seconds < 0 { "-" } else { "" };
        let total_seconds = total_seconds.abs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)
    }

    #[derive(Debug)]
    pub struct ParseDurationError(String);

    impl fmt::Display for ParseDurationError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "not a hh:mm:ss duration: {:?}", self.0)
        }
    }

    impl std::error::Error for ParseDurationError {}

    pub fn parse(value: &str) -> Result<Duration, ParseDurationError> {
        let (sign, rest) = match value.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, value),
        };
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() != 3 {
            return Err(ParseDurationError(value.to_owned()));
        }
        let mut numbers = [0i64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ParseDurationError(value.to_owned()))?;
        }
        let [hours, minutes, seconds] = numbers;
        if minutes >= 60 || seconds >= 60 || minutes < 0 || seconds < 0 || hours < 0 {
            return Err(ParseDurationError(value.to_owned()));
        }
        Ok(Duration::seconds(
            sign * (hours * 3600 + minutes * 60 + seconds),
        ))
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(*duration))
    }

    pub fn serialize_option<S>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_str(&format(*duration)),
            // An empty field, not a null: the CSV event logs leave
            // unused columns empty.
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        parse(&value).map_err(D::Error::custom)
    }

    pub fn deserialize_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        if value.is_empty() {
            return Ok(None);
        }
        parse(&value).map(Some).map_err(D::Error::custom)
    }

    pub fn schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            format: Some("hh:mm:ss".to_owned()),
            ..Default::default()
        }
        .into()
    }

    pub fn schema_option(generator: &mut SchemaGenerator) -> Schema {
        schema(generator)
    }

}
