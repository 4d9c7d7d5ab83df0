use flate2::write::GzEncoder;
use std::io::{BufWriter, Error, IntoInnerError, Write};

/// Closes one writer layer and hands back the layer beneath it.
pub trait Finish<O> {
    fn finish(self) -> Result<O, Error>;
}

impl<W: Write> Finish<W> for GzEncoder<W> {
    fn finish(self) -> Result<W, Error> {
        self.finish()
    }
}

impl<W: Write> Finish<W> for BufWriter<W> {
    fn finish(self) -> Result<W, Error> {
        self.into_inner().map_err(IntoInnerError::into_error)
    }
}

impl<W: Write> Finish<W> for tar::Builder<W> {
    fn finish(self) -> Result<W, Error> {
        self.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use flate2::Compression;
    use std::io::{Cursor, Read};

    struct TestFinisher {
        inner: Cursor<Vec<u8>>,
        should_fail: bool,
    }

    impl Finish<Cursor<Vec<u8>>> for TestFinisher {
        fn finish(self) -> Result<Cursor<Vec<u8>>, Error> {
            if self.should_fail {
                Err(Error::other("Test failure"))
            } else {
                Ok(self.inner)
            }
        }
    }

    #[test]
    fn test_finish_trait_success() {
        let finisher = TestFinisher {
            inner: Cursor::new(vec![1, 2, 3]),
            should_fail: false,
        };

        let returned_cursor = finisher.finish().unwrap();
        assert_eq!(returned_cursor.get_ref(), &vec![1, 2, 3]);
    }

    #[test]
    fn test_finish_trait_failure() {
        let finisher = TestFinisher {
            inner: Cursor::new(vec![1, 2, 3]),
            should_fail: true,
        };

        let error = finisher.finish().unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::Other);
        assert_eq!(error.to_string(), "Test failure");
    }

    #[test]
    fn test_gz_encoder_finish_writes_trailer() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello").unwrap();
        let bytes = Finish::finish(encoder).unwrap();

        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn test_buf_writer_finish_flushes() {
        let mut writer = BufWriter::new(Vec::new());
        writer.write_all(b"buffered").unwrap();
        let bytes = Finish::finish(writer).unwrap();
        assert_eq!(bytes, b"buffered");
    }
}
