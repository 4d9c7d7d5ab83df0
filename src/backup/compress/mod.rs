use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::io::Write;
use validator::Validate;

/// Default compression level (balance of speed vs size)
pub static DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Configuration for the gzip layer wrapped around the tar stream
#[skip_serializing_none]
#[derive(Clone, Default, Validate, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GzipConfig {
    /// Compression level (0-9)
    ///
    /// - 0: No compression, gzip framing only
    /// - 6: Default
    /// - 9: Slowest, smallest files
    #[validate(range(min = 0, max = 9))]
    pub level: Option<u32>,
}

impl GzipConfig {
    pub fn with_level(level: u32) -> Self {
        Self { level: Some(level) }
    }
}

pub trait CompressorBuilder<W: Write> {
    fn build_compressor(&self, writer: W) -> GzEncoder<W>;
}

impl<W: Write> CompressorBuilder<W> for GzipConfig {
    fn build_compressor(&self, writer: W) -> GzEncoder<W> {
        let level = self.level.unwrap_or(DEFAULT_COMPRESSION_LEVEL);
        tracing::debug!("Creating gzip compressor with level={}", level);
        GzEncoder::new(writer, Compression::new(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::finish::Finish;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_config_default() {
        let config = GzipConfig::default();
        assert!(config.level.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gzip_config_validation() {
        for level in [0, 1, 6, 9] {
            assert!(GzipConfig::with_level(level).validate().is_ok());
        }
    }

    #[test]
    fn test_gzip_config_invalid_level() {
        assert!(GzipConfig::with_level(10).validate().is_err());
    }

    #[test]
    fn test_gzip_config_deserialization() {
        let config: GzipConfig = serde_json::from_str(r#"{"level": 9}"#).unwrap();
        assert_eq!(config, GzipConfig::with_level(9));

        let config: GzipConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GzipConfig::default());
    }

    #[test]
    fn test_gzip_config_rejects_unknown_fields() {
        let result = serde_json::from_str::<GzipConfig>(r#"{"level": 1, "thread": 4}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_compressor_produces_gzip() {
        for config in [GzipConfig::default(), GzipConfig::with_level(0)] {
            let mut compressor = config.build_compressor(Vec::new());
            compressor.write_all(b"payload payload payload").unwrap();
            let bytes = Finish::finish(compressor).unwrap();

            // gzip magic
            assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

            let mut decoded = String::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_string(&mut decoded)
                .unwrap();
            assert_eq!(decoded, "payload payload payload");
        }
    }
}
