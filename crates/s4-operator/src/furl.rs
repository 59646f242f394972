//! Foolscap connection strings ("furls") of the form
//! `pb://<tub-id>@<hint>[,<hint>...]/<name>`.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu, ensure};

const SCHEME: &str = "pb://";

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseFurlError {
    #[snafu(display("furl {input:?} does not start with {SCHEME:?}"))]
    MissingScheme { input: String },

    #[snafu(display("furl {input:?} has no tub id"))]
    MissingTubId { input: String },

    #[snafu(display("furl {input:?} has no name"))]
    MissingName { input: String },

    #[snafu(display("furl {input:?} has no location hints"))]
    MissingLocationHints { input: String },
}

/// A validated furl.
///
/// Furls are opaque to everything but Foolscap, so the text a furl was
/// parsed from is kept and handed on unchanged.
///
/// ```
/// use s4_operator::furl::Furl;
///
/// let furl: Furl = "pb://tubid@10.0.0.1:47000,127.0.0.1:47000/introducer".parse().unwrap();
/// assert_eq!(furl.tub_id(), "tubid");
/// assert_eq!(
///     furl.location_hints().collect::<Vec<_>>(),
///     ["10.0.0.1:47000", "127.0.0.1:47000"]
/// );
/// assert_eq!(furl.name(), "introducer");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Furl {
    raw: String,
    /// Position of the `@` ending the tub id.
    at: usize,
    /// Position of the `/` starting the name.
    slash: usize,
}

impl Furl {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn tub_id(&self) -> &str {
        &self.raw[SCHEME.len()..self.at]
    }

    /// The non-empty location hints, in order.
    pub fn location_hints(&self) -> impl Iterator<Item = &str> {
        self.raw[self.at + 1..self.slash]
            .split(',')
            .filter(|hint| !hint.is_empty())
    }

    /// The swiss number naming the referenced object.
    pub fn name(&self) -> &str {
        &self.raw[self.slash + 1..]
    }
}

impl FromStr for Furl {
    type Err = ParseFurlError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let rest = input
            .strip_prefix(SCHEME)
            .context(MissingSchemeSnafu { input })?;
        let at = SCHEME.len() + rest.find('@').context(MissingTubIdSnafu { input })?;
        ensure!(at > SCHEME.len(), MissingTubIdSnafu { input });

        let slash = input.rfind('/').filter(|slash| *slash > at);
        let slash = slash.context(MissingNameSnafu { input })?;
        ensure!(slash + 1 < input.len(), MissingNameSnafu { input });

        ensure!(
            input[at + 1..slash].split(',').any(|hint| !hint.is_empty()),
            MissingLocationHintsSnafu { input }
        );

        Ok(Self {
            raw: input.to_owned(),
            at,
            slash,
        })
    }
}

impl TryFrom<String> for Furl {
    type Error = ParseFurlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Furl> for String {
    fn from(furl: Furl) -> Self {
        furl.raw
    }
}

impl Display for Furl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("pb://abc@a.example.com:1,b.example.com:2/swiss")]
    #[case("pb://tub@a:1,,b:2/swiss")]
    #[case("pb://tub@tcp:a:1,/swiss")]
    fn text_is_kept_verbatim(#[case] input: &str) {
        let furl: Furl = input.parse().unwrap();

        assert_eq!(furl.to_string(), input);
        assert_eq!(String::from(furl.clone()), input);
        assert_eq!(serde_json::to_value(&furl).unwrap(), input);
    }

    #[test]
    fn parts_skip_empty_hints() {
        let furl: Furl = "pb://tub@a:1,,b:2/swiss".parse().unwrap();

        assert_eq!(furl.tub_id(), "tub");
        assert_eq!(furl.location_hints().collect::<Vec<_>>(), ["a:1", "b:2"]);
        assert_eq!(furl.name(), "swiss");
    }

    #[rstest]
    #[case("abc@host:1/swiss", ParseFurlError::MissingScheme { input: "abc@host:1/swiss".to_owned() })]
    #[case("pb://host:1/swiss", ParseFurlError::MissingTubId { input: "pb://host:1/swiss".to_owned() })]
    #[case("pb://@host:1/swiss", ParseFurlError::MissingTubId { input: "pb://@host:1/swiss".to_owned() })]
    #[case("pb://abc@host:1", ParseFurlError::MissingName { input: "pb://abc@host:1".to_owned() })]
    #[case("pb://abc@host:1/", ParseFurlError::MissingName { input: "pb://abc@host:1/".to_owned() })]
    #[case("pb://abc@/swiss", ParseFurlError::MissingLocationHints { input: "pb://abc@/swiss".to_owned() })]
    #[case("pb://abc@,/swiss", ParseFurlError::MissingLocationHints { input: "pb://abc@,/swiss".to_owned() })]
    fn invalid_furls(#[case] input: &str, #[case] expected: ParseFurlError) {
        assert_eq!(input.parse::<Furl>().unwrap_err(), expected);
    }

    #[test]
    fn serializes_as_string() {
        let furl: Furl = "pb://abc@host:1/swiss".parse().unwrap();
        assert_eq!(
            serde_json::to_value(&furl).unwrap(),
            serde_json::json!("pb://abc@host:1/swiss")
        );
    }
}
