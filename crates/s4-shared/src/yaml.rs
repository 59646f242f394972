//! Utility functions for processing data in the YAML file format
use std::io::{Read, Write};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents every error which can be encountered during YAML (de)serialization.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize YAML"))]
    SerializeYaml { source: serde_yaml::Error },

    #[snafu(display("failed to deserialize YAML document #{index}"))]
    DeserializeYaml {
        source: serde_yaml::Error,
        index: usize,
    },

    #[snafu(display("failed to write YAML document separator"))]
    WriteDocumentSeparator { source: std::io::Error },

    #[snafu(display("failed to read YAML input"))]
    ReadInput { source: std::io::Error },
}

/// Provides configurable options during YAML serialization.
///
/// For most people the default implementation [`SerializeOptions::default()`] is sufficient as it
/// enables explicit document and singleton map serialization.
pub struct SerializeOptions {
    /// Adds leading triple dashes (`---`) to the output string.
    pub explicit_document: bool,

    /// Serialize enum variants as YAML maps using the variant name as the key.
    pub singleton_map: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            explicit_document: true,
            singleton_map: true,
        }
    }
}

/// Serializes the given data structure and writes it to a [`Writer`](Write).
pub fn serialize<T, W>(value: &T, mut writer: W, options: SerializeOptions) -> Result<()>
where
    T: Serialize,
    W: Write,
{
    if options.explicit_document {
        writer
            .write_all(b"---\n")
            .context(WriteDocumentSeparatorSnafu)?;
    }

    let mut serializer = serde_yaml::Serializer::new(writer);

    if options.singleton_map {
        serde_yaml::with::singleton_map_recursive::serialize(value, &mut serializer)
            .context(SerializeYamlSnafu)?;
    } else {
        value
            .serialize(&mut serializer)
            .context(SerializeYamlSnafu)?;
    }

    Ok(())
}

/// Serializes every value as its own explicit YAML document, producing a
/// multi-document stream.
pub fn serialize_all<'a, T, I, W>(values: I, mut writer: W) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
    W: Write,
{
    for value in values {
        serialize(value, &mut writer, SerializeOptions::default())?;
    }
    Ok(())
}

/// Deserializes every document of a multi-document YAML stream.
///
/// Empty documents (for example a trailing `---`) are skipped. The first
/// document which fails to deserialize aborts the whole call.
pub fn deserialize_all<T>(input: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut documents = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(input).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .context(DeserializeYamlSnafu { index })?;
        if value.is_null() {
            continue;
        }
        documents.push(serde_yaml::from_value(value).context(DeserializeYamlSnafu { index })?);
    }

    Ok(documents)
}

/// Reads `reader` to its end and deserializes every document in it.
pub fn read_all<T, R>(mut reader: R) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut input = String::new();
    reader.read_to_string(&mut input).context(ReadInputSnafu)?;
    deserialize_all(&input)
}
