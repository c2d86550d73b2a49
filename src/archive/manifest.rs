use crate::error::{ArchiveError, ArchiveResult};
use std::io::BufRead;

const HEADER: &[u8] = b"list([\r\n";
const FILE_OPEN: &[u8] = b"{file:";
const SIZE_OPEN: &[u8] = b",size:";
const CONTINUATION: &[u8] = b",\r\n";
const LAST_RECORD: &[u8] = b"\r\n";

/// One `{file:'<name>',size:<digits>}` entry of the remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestToken {
    pub file: String,
    pub size: u64,
}

/// Fixed-grammar reader for the remote `list([ ... ])` manifest.
///
/// The remote side emits a narrow slice of a script array literal, so every
/// delimiter is matched byte for byte instead of going through a general
/// parser. Iteration yields tokens until the list ends or a record is
/// malformed; in the latter case [`ManifestParser::finish`] returns the error.
pub struct ManifestParser<R> {
    reader: R,
    finished: bool,
    err: Option<ArchiveError>,
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn mismatch(read: &[u8], expected: &[u8]) -> ArchiveError {
    ArchiveError::UnexpectedLiteral {
        read: lossy(read),
        expected: lossy(expected),
    }
}

impl<R: BufRead> ManifestParser<R> {
    /// Consume and check the header. Nothing is yielded when it is wrong.
    pub fn new(reader: R) -> ArchiveResult<Self> {
        let mut parser = Self {
            reader,
            finished: false,
            err: None,
        };
        parser.read_literal(b'\n', HEADER)?;
        Ok(parser)
    }

    pub fn finish(self) -> ArchiveResult<()> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read_until(&mut self, delim: u8) -> ArchiveResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader.read_until(delim, &mut buf)?;
        Ok(buf)
    }

    fn read_literal(&mut self, delim: u8, expected: &[u8]) -> ArchiveResult<()> {
        let literal = self.read_until(delim)?;
        if literal != expected {
            return Err(mismatch(&literal, expected));
        }
        Ok(())
    }

    fn read_file_name(&mut self) -> ArchiveResult<String> {
        let quote = self.read_until_exact(1)?;
        if quote != b"'" {
            return Err(mismatch(&quote, b"'"));
        }
        let mut name = self.read_until(b'\'')?;
        if name.pop() != Some(b'\'') {
            return Err(mismatch(&name, b"<name>'"));
        }
        String::from_utf8(name).map_err(|err| mismatch(err.as_bytes(), b"<utf-8 name>'"))
    }

    fn read_until_exact(&mut self, len: usize) -> ArchiveResult<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let available = self.reader.fill_buf()?;
            if available.is_empty() {
                break;
            }
            let take = available.len().min(len - out.len());
            out.extend_from_slice(&available[..take]);
            self.reader.consume(take);
        }
        Ok(out)
    }

    fn read_size(&mut self) -> ArchiveResult<u64> {
        let mut digits = self.read_until(b'}')?;
        if digits.pop() != Some(b'}') {
            return Err(mismatch(&digits, b"<digits>}"));
        }
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(ArchiveError::InvalidSize(lossy(&digits)));
        }
        lossy(&digits)
            .parse::<u64>()
            .map_err(|_| ArchiveError::InvalidSize(lossy(&digits)))
    }

    /// True unless the input is exhausted or the closing `]` comes next.
    fn record_follows(&mut self) -> ArchiveResult<bool> {
        let available = self.reader.fill_buf()?;
        Ok(!matches!(available.first(), None | Some(b']')))
    }

    /// Read one record, returning it and whether a continuation marker followed.
    fn read_record(&mut self) -> ArchiveResult<(ManifestToken, bool)> {
        self.read_literal(b':', FILE_OPEN)?;
        let file = self.read_file_name()?;
        self.read_literal(b':', SIZE_OPEN)?;
        let size = self.read_size()?;
        let trailer = self.read_until(b'\n')?;
        let more = match trailer.as_slice() {
            CONTINUATION => true,
            LAST_RECORD | b"" => false,
            other => return Err(mismatch(other, CONTINUATION)),
        };
        Ok((ManifestToken { file, size }, more))
    }

    fn step(&mut self) -> ArchiveResult<Option<ManifestToken>> {
        if !self.record_follows()? {
            return Ok(None);
        }
        let (token, more) = self.read_record()?;
        if !more {
            self.finished = true;
        }
        Ok(Some(token))
    }
}

impl<R: BufRead> Iterator for ManifestParser<R> {
    type Item = ManifestToken;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.step() {
            Ok(Some(token)) => Some(token),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.err = Some(err);
                self.finished = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(file: &str, size: u64) -> ManifestToken {
        ManifestToken {
            file: file.to_string(),
            size,
        }
    }

    #[test]
    fn parses_records_in_order() {
        let input = b"list([\r\n{file:'scb20060101.01.gz',size:1234},\r\n{file:'scb20060101.02.gz',size:99}\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        let tokens: Vec<ManifestToken> = parser.by_ref().collect();
        assert_eq!(
            tokens,
            vec![
                token("scb20060101.01.gz", 1234),
                token("scb20060101.02.gz", 99)
            ]
        );
        parser.finish().expect("clean");
    }

    #[test]
    fn rejects_wrong_header_before_any_record() {
        let input = b"list[\r\n{file:'scb20060101.01.gz',size:1234}\r\n";
        let err = ManifestParser::new(&input[..]).err().expect("header error");
        match err {
            ArchiveError::UnexpectedLiteral { read, expected } => {
                assert_eq!(read, "list[\r\n");
                assert_eq!(expected, "list([\r\n");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_list_yields_nothing() {
        let input = b"list([\r\n]);\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        assert!(parser.next().is_none());
        parser.finish().expect("clean");
    }

    #[test]
    fn last_record_without_continuation_ends_the_list() {
        let input = b"list([\r\n{file:'a.gz',size:1}\r\n]);\r\n";
        let parser = ManifestParser::new(&input[..]).expect("header");
        assert_eq!(parser.count(), 1);
    }

    #[test]
    fn malformed_record_halts_with_error() {
        let input = b"list([\r\n{file:'a.gz',size:1},\r\n{name:'b.gz',size:2},\r\n{file:'c.gz',size:3}\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        let tokens: Vec<ManifestToken> = parser.by_ref().collect();
        assert_eq!(tokens, vec![token("a.gz", 1)]);
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.finish(),
            Err(ArchiveError::UnexpectedLiteral { read, expected })
                if read == "{name:" && expected == "{file:"
        ));
    }

    #[test]
    fn bare_newline_after_record_is_rejected() {
        let input = b"list([\r\n{file:'a.gz',size:1},\n{file:'b.gz',size:2}\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.finish(),
            Err(ArchiveError::UnexpectedLiteral { read, expected })
                if read == ",\n" && expected == ",\r\n"
        ));
    }

    #[test]
    fn junk_after_record_is_rejected() {
        let input = b"list([\r\n{file:'a.gz',size:1}x\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.finish(),
            Err(ArchiveError::UnexpectedLiteral { read, .. }) if read == "x\r\n"
        ));
    }

    #[test]
    fn last_record_at_end_of_input_is_kept() {
        let input = b"list([\r\n{file:'a.gz',size:1}";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        assert_eq!(parser.by_ref().collect::<Vec<_>>(), vec![token("a.gz", 1)]);
        parser.finish().expect("clean");
    }

    #[test]
    fn non_numeric_size_is_rejected() {
        let input = b"list([\r\n{file:'a.gz',size:12x}\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        assert!(parser.next().is_none());
        assert!(matches!(parser.finish(), Err(ArchiveError::InvalidSize(s)) if s == "12x"));
    }

    #[test]
    fn unquoted_file_name_is_rejected() {
        let input = b"list([\r\n{file:a.gz,size:1}\r\n";
        let mut parser = ManifestParser::new(&input[..]).expect("header");
        assert!(parser.next().is_none());
        assert!(matches!(
            parser.finish(),
            Err(ArchiveError::UnexpectedLiteral { read, .. }) if read == "a"
        ));
    }
}
