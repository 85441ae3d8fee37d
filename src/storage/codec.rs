//! Serialization codec used for every file the crate writes.
//!
//! Values are encoded whole into one file per name. `Bincode` is compact and
//! fast but needs the concrete type to decode; `Json` is self-describing and
//! can hold values such as `serde_json::Value`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::PICKLE_EXTENSION;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    Bincode,
    Json,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode value with {codec:?}: {reason}")]
    Encode { codec: Codec, reason: String },

    #[error("Failed to decode value with {codec:?}: {reason}")]
    Decode { codec: Codec, reason: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Codec {
    pub fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Bincode => bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map_err(|e| CodecError::Encode {
                    codec: *self,
                    reason: e.to_string(),
                }),
            Codec::Json => serde_json::to_vec(value).map_err(|e| CodecError::Encode {
                codec: *self,
                reason: e.to_string(),
            }),
        }
    }

    pub fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CodecError> {
        match self {
            Codec::Bincode => {
                bincode::serde::decode_from_slice::<V, _>(bytes, bincode::config::standard())
                    .map(|(value, _read)| value)
                    .map_err(|e| CodecError::Decode {
                        codec: *self,
                        reason: e.to_string(),
                    })
            }
            Codec::Json => serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
                codec: *self,
                reason: e.to_string(),
            }),
        }
    }

    /// Encode `value` and write it to `path`, creating parent directories.
    pub fn write_file<V: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &V,
    ) -> Result<(), CodecError> {
        let bytes = self.encode(value)?;
        write_bytes(path, &bytes)
    }

    /// Read and decode the file at `path`.
    pub fn read_file<V: DeserializeOwned>(&self, path: &Path) -> Result<V, CodecError> {
        let bytes = read_bytes(path)?;
        self.decode(&bytes)
    }
}

/// Write already-encoded bytes to `path`, creating parent directories.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), CodecError> {
    let io_err = |source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)?;
    file.flush().map_err(io_err)
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>, CodecError> {
    fs::read(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// A name that cannot be used as the stem of a file inside its directory
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid file name '{name}': {reason}")]
pub struct InvalidFileName {
    pub name: String,
    pub reason: String,
}

/// Check that `name` stays inside the directory it is joined to.
pub fn validate_file_stem(name: &str) -> Result<(), InvalidFileName> {
    let invalid = |reason: &str| InvalidFileName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name cannot be a relative path component"));
    }
    if name.chars().any(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(invalid("name cannot contain path separators"));
    }
    Ok(())
}

/// `<dir>/<name>.pkl`
pub fn pickle_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{PICKLE_EXTENSION}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Lookup {
        name: String,
        weights: HashMap<String, f64>,
    }

    fn sample() -> Lookup {
        let mut weights = HashMap::new();
        weights.insert("alpha".to_string(), 0.25);
        weights.insert("beta".to_string(), 4.0);
        Lookup {
            name: "lookup".to_string(),
            weights,
        }
    }

    #[test]
    fn test_file_round_trip_both_codecs() {
        let temp_dir = TempDir::new().unwrap();

        for codec in [Codec::Bincode, Codec::Json] {
            let path = pickle_path(&temp_dir.path().join("nested"), &format!("{codec:?}"));
            codec.write_file(&path, &sample()).unwrap();
            assert!(path.exists());

            let loaded: Lookup = codec.read_file(&path).unwrap();
            assert_eq!(loaded, sample());
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let result: Result<Lookup, _> = Codec::Bincode.read_file(&temp_dir.path().join("gone.pkl"));
        assert!(matches!(result, Err(CodecError::Io { .. })));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result: Result<Lookup, _> = Codec::Json.decode(b"not json");
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_json_codec_handles_self_describing_values() {
        let value = serde_json::json!({"artist": "Pink Floyd", "year": 1973});
        let bytes = Codec::Json.encode(&value).unwrap();
        let decoded: serde_json::Value = Codec::Json.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_file_stem_rejects_escaping_names() {
        assert!(validate_file_stem("lookup").is_ok());
        assert!(validate_file_stem("run.v2").is_ok());
        for name in ["", ".", "..", "../Other/secret", "a/b", "a\\b", "nul\0"] {
            assert!(validate_file_stem(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_pickle_path_layout() {
        let path = pickle_path(Path::new("temp_pickle/run-1"), "lookup");
        assert_eq!(path, PathBuf::from("temp_pickle/run-1/lookup.pkl"));
    }
}
