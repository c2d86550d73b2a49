use crate::archive::category::Category;
use crate::archive::util::{base_name, localize, parse_embedded_date};
use crate::error::{ArchiveError, ArchiveResult};
use chrono::{DateTime, NaiveTime};
use chrono_tz::Tz;
use flate2::read::MultiGzDecoder;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::Path;

const FIELD_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMark {
    Implicit,
    Plus,
    Minus,
}

/// Fixed-point score with one decimal digit, kept as tenths.
///
/// The sign marker seen in the text is retained so that encoding gives back
/// the exact input (`+12.0`, `-0.0`, `7.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    tenths: i64,
    sign: SignMark,
}

impl Score {
    pub fn tenths(&self) -> i64 {
        self.tenths
    }

    pub fn value(&self) -> f64 {
        self.tenths() as f64 / 10.0
    }

    fn parse(text: &str) -> ArchiveResult<Self> {
        let malformed = || ArchiveError::MalformedField {
            field: "score",
            value: text.to_string(),
        };
        let (sign, digits) = match text.as_bytes().first() {
            Some(b'+') => (SignMark::Plus, &text[1..]),
            Some(b'-') => (SignMark::Minus, &text[1..]),
            _ => (SignMark::Implicit, text),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (digits, None),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        // At most one digit after the point; a bare integer reads as `.0`.
        let frac_digit = match frac {
            None => 0,
            Some(f) if f.len() == 1 && f.as_bytes()[0].is_ascii_digit() => {
                i64::from(f.as_bytes()[0] - b'0')
            }
            Some(_) => return Err(malformed()),
        };
        let magnitude = whole
            .parse::<i64>()
            .ok()
            .and_then(|w| w.checked_mul(10))
            .and_then(|w| w.checked_add(frac_digit))
            .ok_or_else(malformed)?;
        let tenths = if sign == SignMark::Minus {
            -magnitude
        } else {
            magnitude
        };
        Ok(Self { tenths, sign })
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.tenths.unsigned_abs();
        let sign = match self.sign {
            SignMark::Plus => "+",
            SignMark::Minus => "-",
            SignMark::Implicit if self.tenths < 0 => "-",
            SignMark::Implicit => "",
        };
        write!(f, "{sign}{}.{}", magnitude / 10, magnitude % 10)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerScore {
    pub name: String,
    pub score: Score,
}

/// One decoded line of a score archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub lobby: String,
    pub start: DateTime<Tz>,
    pub game_mode: String,
    pub scores: Vec<PlayerScore>,
}

impl LineRecord {
    pub fn player_count(&self) -> usize {
        self.scores.len()
    }
}

/// Players implied by the first character of the game mode.
pub fn players_for_mode(game_mode: &str) -> ArchiveResult<usize> {
    match game_mode.chars().next() {
        Some('三') => Ok(3),
        Some('四') => Ok(4),
        _ => Err(ArchiveError::UnknownGameMode(game_mode.to_string())),
    }
}

fn parse_lobby(field: &str) -> ArchiveResult<String> {
    if field.chars().count() != 5 || !field.starts_with('L') {
        return Err(ArchiveError::MalformedField {
            field: "lobby",
            value: field.to_string(),
        });
    }
    Ok(field.to_string())
}

fn parse_start(field: &str) -> ArchiveResult<NaiveTime> {
    let malformed = || ArchiveError::MalformedField {
        field: "start time",
        value: field.to_string(),
    };
    let bytes = field.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(malformed());
    }
    let two = |pair: &[u8]| -> Option<u32> {
        if pair.iter().all(u8::is_ascii_digit) {
            Some(u32::from(pair[0] - b'0') * 10 + u32::from(pair[1] - b'0'))
        } else {
            None
        }
    };
    let (Some(hour), Some(minute)) = (two(&bytes[0..2]), two(&bytes[3..5])) else {
        return Err(malformed());
    };
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(malformed)
}

fn parse_player(entry: &str) -> ArchiveResult<PlayerScore> {
    let malformed = || ArchiveError::MalformedField {
        field: "player score",
        value: entry.to_string(),
    };
    let open = entry.rfind('(').ok_or_else(malformed)?;
    let inner = entry[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
    let score_text = match inner.split_once(',') {
        Some((score, _extra)) => score,
        None => inner,
    };
    Ok(PlayerScore {
        name: entry[..open].to_string(),
        score: Score::parse(score_text)?,
    })
}

fn parse_players(field: &str, expected: usize) -> ArchiveResult<Vec<PlayerScore>> {
    let entries: Vec<&str> = field.split(' ').collect();
    if entries.len() != expected {
        return Err(ArchiveError::PlayerCount {
            expected,
            got: entries.len(),
        });
    }
    entries.into_iter().map(parse_player).collect()
}

/// Line grammars, one variant per supported category prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `L1234 | HH:MM | 四... | name(+12.3) name(-4.0) ...`
    Sca,
}

impl LineFormat {
    pub fn for_category(category: Category) -> ArchiveResult<Self> {
        match category {
            Category::Sca => Ok(Self::Sca),
            other => Err(ArchiveError::UnsupportedCategory(other.to_string())),
        }
    }

    pub fn for_file_name(name: &str) -> ArchiveResult<Self> {
        Self::for_category(Category::from_file_name(name)?)
    }

    pub fn decode(self, line: &str, date: &DateTime<Tz>) -> ArchiveResult<LineRecord> {
        match self {
            Self::Sca => decode_sca(line, date),
        }
    }

    pub fn encode(self, record: &LineRecord) -> String {
        match self {
            Self::Sca => encode_sca(record),
        }
    }
}

fn decode_sca(line: &str, date: &DateTime<Tz>) -> ArchiveResult<LineRecord> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != 4 {
        return Err(ArchiveError::FieldCount {
            expected: 4,
            got: fields.len(),
        });
    }

    let lobby = parse_lobby(fields[0])?;
    let time = parse_start(fields[1])?;
    let game_mode = fields[2].to_string();
    let players = players_for_mode(&game_mode)?;
    let scores = parse_players(fields[3], players)?;
    let start = localize(date.date_naive().and_time(time), date.timezone())?;

    Ok(LineRecord {
        lobby,
        start,
        game_mode,
        scores,
    })
}

fn encode_sca(record: &LineRecord) -> String {
    let mut out = String::with_capacity(64);
    out.push_str(&record.lobby);
    out.push_str(FIELD_SEPARATOR);
    out.push_str(&record.start.format("%H:%M").to_string());
    out.push_str(FIELD_SEPARATOR);
    out.push_str(&record.game_mode);
    out.push_str(" |");
    for player in &record.scores {
        out.push(' ');
        out.push_str(&player.name);
        out.push('(');
        out.push_str(&player.score.to_string());
        out.push(')');
    }
    out
}

/// Lazy reader over one decompressed archive file.
///
/// Iteration stops at end of input or at the first line that fails to
/// decode; the failure is kept and surfaced by [`ScxLog::finish`].
pub struct ScxLog<R> {
    date: DateTime<Tz>,
    format: LineFormat,
    lines: Lines<BufReader<R>>,
    err: Option<ArchiveError>,
    done: bool,
}

impl ScxLog<MultiGzDecoder<File>> {
    pub fn open(path: &Path, tz: Tz) -> ArchiveResult<Self> {
        let name = base_name(path);
        let format = LineFormat::for_file_name(name)?;
        let date = parse_embedded_date(name, tz)?;
        let file = File::open(path).map_err(|err| ArchiveError::at(path, err))?;
        Ok(Self::with_format(format, date, MultiGzDecoder::new(file)))
    }
}

impl<R: Read> ScxLog<R> {
    /// Read already-decompressed text, taking category and date from `name`.
    #[cfg(test)]
    pub fn from_reader(name: &str, reader: R, tz: Tz) -> ArchiveResult<Self> {
        let format = LineFormat::for_file_name(name)?;
        let date = parse_embedded_date(name, tz)?;
        Ok(Self::with_format(format, date, reader))
    }

    fn with_format(format: LineFormat, date: DateTime<Tz>, reader: R) -> Self {
        Self {
            date,
            format,
            lines: BufReader::new(reader).lines(),
            err: None,
            done: false,
        }
    }

    pub fn date(&self) -> &DateTime<Tz> {
        &self.date
    }

    pub fn format(&self) -> LineFormat {
        self.format
    }

    /// Consume the reader, returning the error that halted iteration, if any.
    pub fn finish(self) -> ArchiveResult<()> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Next raw line paired with its decoded record.
    pub fn next_with_line(&mut self) -> Option<(String, LineRecord)> {
        if self.done {
            return None;
        }
        let decoded = match self.lines.next()? {
            Ok(line) => self
                .format
                .decode(&line, &self.date)
                .map(|record| (line, record)),
            Err(err) => Err(ArchiveError::Io(err)),
        };
        match decoded {
            Ok(pair) => Some(pair),
            Err(err) => {
                self.err = Some(err);
                self.done = true;
                None
            }
        }
    }
}

impl<R: Read> Iterator for ScxLog<R> {
    type Item = LineRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_line().map(|(_, record)| record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::util::parse_day;

    fn tokyo() -> Tz {
        "Asia/Tokyo".parse().expect("tz")
    }

    fn day() -> DateTime<Tz> {
        parse_day("2020-07-01", tokyo()).expect("day")
    }

    #[test]
    fn decodes_four_player_line() {
        let line = "L1234 | 21:05 | 四般東喰赤 | alice(+52.0) bob(+7.0) carol(-19.0) dave(-40.0)";
        let record = LineFormat::Sca.decode(line, &day()).expect("decode");
        assert_eq!(record.lobby, "L1234");
        assert_eq!(record.player_count(), 4);
        assert_eq!(record.scores[2].name, "carol");
        assert_eq!(record.scores[2].score.tenths(), -190);
        assert_eq!(
            record.start.format("%Y-%m-%d %H:%M %z").to_string(),
            "2020-07-01 21:05 +0900"
        );
    }

    #[test]
    fn encode_reproduces_input_exactly() {
        for line in [
            "L1234 | 21:05 | 四般東喰赤 | alice(+52.0) bob(+7.0) carol(-19.0) dave(-40.0)",
            "L0001 | 00:00 | 三 | x(0.5) y(-0.0) z(123.4)",
            "L9999 | 23:59 | 三般南 | (a)(b)(+1.0) 名前(-2.3) c(d)(+1.3)",
        ] {
            let record = LineFormat::Sca.decode(line, &day()).expect("decode");
            assert_eq!(LineFormat::Sca.encode(&record), line);
        }
    }

    #[test]
    fn trailing_extra_field_is_discarded() {
        let line = "L1234 | 10:00 | 三 | a(+1.0,3) b(+2.0,1) c(-3.0,2)";
        let record = LineFormat::Sca.decode(line, &day()).expect("decode");
        assert_eq!(record.scores[0].score.tenths(), 10);
        assert_eq!(
            LineFormat::Sca.encode(&record),
            "L1234 | 10:00 | 三 | a(+1.0) b(+2.0) c(-3.0)"
        );
    }

    #[test]
    fn integer_score_gains_a_decimal_digit() {
        let line = "L1234 | 10:00 | 三 | a(+12) b(-2) c(-10.0)";
        let record = LineFormat::Sca.decode(line, &day()).expect("decode");
        assert_eq!(record.scores[0].score.tenths(), 120);
        assert_eq!(
            LineFormat::Sca.encode(&record),
            "L1234 | 10:00 | 三 | a(+12.0) b(-2.0) c(-10.0)"
        );
    }

    #[test]
    fn player_count_must_match_mode() {
        let line = "L1234 | 10:00 | 四 | a(+1.0) b(+2.0) c(-3.0)";
        let err = LineFormat::Sca.decode(line, &day()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::PlayerCount {
                expected: 4,
                got: 3
            }
        ));
    }

    #[test]
    fn rejects_malformed_lines() {
        for line in [
            "L1234 | 10:00 | 三",
            "X1234 | 10:00 | 三 | a(1.0) b(2.0) c(3.0)",
            "L1234 | 1:00 | 三 | a(1.0) b(2.0) c(3.0)",
            "L1234 | 24:00 | 三 | a(1.0) b(2.0) c(3.0)",
            "L1234 | 10:00 | 五 | a(1.0) b(2.0) c(3.0)",
            "L1234 | 10:00 | 三 | a(1.05) b(2.0) c(3.0)",
            "L1234 | 10:00 | 三 | a1.0 b(2.0) c(3.0)",
            "L1234 | 10:00 | 三 | a(1.) b(2.0) c(3.0)",
        ] {
            assert!(LineFormat::Sca.decode(line, &day()).is_err(), "{line}");
        }
    }

    #[test]
    fn only_sca_is_registered() {
        assert_eq!(
            LineFormat::for_file_name("sca20200701.log.gz").expect("sca"),
            LineFormat::Sca
        );
        let err = LineFormat::for_file_name("scb20200701.log.gz").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedCategory(c) if c == "scb"));
    }

    #[test]
    fn reader_halts_on_first_bad_line() {
        let text = "L1234 | 10:00 | 三 | a(1.0) b(2.0) c(3.0)\n\
                    garbage\n\
                    L1234 | 11:00 | 三 | a(1.0) b(2.0) c(3.0)\n";
        let mut log =
            ScxLog::from_reader("sca20200701.log", text.as_bytes(), tokyo()).expect("reader");
        let records: Vec<LineRecord> = log.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert!(log.next().is_none());
        assert!(matches!(
            log.finish(),
            Err(ArchiveError::FieldCount { got: 1, .. })
        ));
    }

    #[test]
    fn reader_over_clean_input_finishes_ok() {
        let text = "L1234 | 10:00 | 三 | a(1.0) b(2.0) c(3.0)\nL4321 | 11:30 | 四 | a(1.0) b(2.0) c(3.0) d(4.0)\n";
        let mut log =
            ScxLog::from_reader("sca20200701.log", text.as_bytes(), tokyo()).expect("reader");
        let starts: Vec<String> = log
            .by_ref()
            .map(|r| r.start.format("%H:%M").to_string())
            .collect();
        assert_eq!(starts, vec!["10:00", "11:30"]);
        log.finish().expect("clean");
    }
}
