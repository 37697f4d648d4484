//! Streaming NMEA 0183 sentence parser.
//!
//! Bytes are fed one at a time into a small state machine that splits the
//! sentence into comma separated fields and keeps a running XOR checksum.
//! Only checksum-valid `VTG` (track and ground speed) and `GLL` (position)
//! sentences are surfaced. Everything else is protocol noise: it is dropped
//! and counted in [`ParserStats`], never reported as an error.

use log::debug;

use crate::position::Position;

/// Longest sentence accepted, counted after the `$`. Anything longer is
/// garbage from a corrupted stream and gets abandoned.
pub const MAX_SENTENCE_CHARS: usize = 76;

const HEMISPHERES: [&str; 4] = ["N", "S", "E", "W"];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UtcTime {
    /// UTC hour plus the configured local offset (not wrapped).
    pub hours: i32,
    pub minutes: u32,
    pub seconds: f64,
}

/// Course over ground and ground speed from a `VTG` sentence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackReport {
    pub course_deg: f64,
    pub speed_knots: f64,
}

/// Time and position from a `GLL` sentence. `fix` is `None` when the
/// receiver flags the data as invalid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionReport {
    pub utc: UtcTime,
    pub fix: Option<Position>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sentence {
    Track(TrackReport),
    Position(PositionReport),
}

impl Sentence {
    pub fn kind(&self) -> &'static str {
        match self {
            Sentence::Track(_) => "VTG",
            Sentence::Position(_) => "GLL",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParserStats {
    /// Sentences whose checksum did not match (or was not hex).
    pub crc_fails: u32,
    /// Checksum-valid sentences, supported or not.
    pub clean_sentences: u32,
    /// Clean, supported sentences whose fields extracted successfully.
    pub parsed_sentences: u32,
    /// Sentences dropped for exceeding [`MAX_SENTENCE_CHARS`].
    pub abandoned: u32,
}

pub struct NmeaParser {
    segments: Vec<String>,
    crc_xor: u8,
    sentence_active: bool,
    process_crc: bool,
    char_count: usize,
    /// Bytes that followed the last sentence returned by `ingest`.
    pending: Vec<u8>,
    local_offset_hours: i32,
    stats: ParserStats,
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new(0)
    }
}

impl NmeaParser {
    pub fn new(local_offset_hours: i32) -> Self {
        Self {
            segments: Vec::new(),
            crc_xor: 0,
            sentence_active: false,
            process_crc: false,
            char_count: 0,
            pending: Vec::new(),
            local_offset_hours,
            stats: ParserStats::default(),
        }
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Feeds a chunk of raw serial data and returns the first supported
    /// sentence completed by it.
    ///
    /// Bytes after that sentence are kept and processed ahead of the next
    /// call's input, so a caller drains a burst by calling `ingest(&[])`
    /// until it returns `None`. A sentence split across calls parses the
    /// same as one delivered whole.
    pub fn ingest(&mut self, bytes: &[u8]) -> Option<Sentence> {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        for (idx, &byte) in input.iter().enumerate() {
            if let Some(sentence) = self.update(byte) {
                self.pending = input[idx + 1..].to_vec();
                return Some(sentence);
            }
        }
        None
    }

    /// Drops bytes buffered from a previous `ingest` call.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    fn new_sentence(&mut self) {
        self.segments.clear();
        self.segments.push(String::new());
        self.crc_xor = 0;
        self.sentence_active = true;
        self.process_crc = true;
        self.char_count = 0;
    }

    fn update(&mut self, byte: u8) -> Option<Sentence> {
        // printable ASCII plus line feed and carriage return
        if !(10..=126).contains(&byte) {
            return None;
        }
        self.char_count += 1;

        if byte == b'$' {
            self.new_sentence();
            return None;
        }
        if !self.sentence_active {
            return None;
        }

        let mut valid_sentence = false;
        match byte {
            b'*' => {
                // the two checksum digits are not part of the checksum
                self.process_crc = false;
                self.segments.push(String::new());
                return None;
            }
            b',' => self.segments.push(String::new()),
            _ => {
                let field = self.segments.last_mut()?;
                field.push(byte as char);

                if !self.process_crc && field.len() == 2 {
                    match u8::from_str_radix(field, 16) {
                        Ok(crc) if crc == self.crc_xor => valid_sentence = true,
                        _ => {
                            debug!(
                                "NMEA checksum mismatch: got '{}', computed {:02X}",
                                field, self.crc_xor
                            );
                            self.stats.crc_fails += 1;
                            self.sentence_active = false;
                            return None;
                        }
                    }
                }
            }
        }

        if self.process_crc {
            self.crc_xor ^= byte;
        }

        if valid_sentence {
            self.stats.clean_sentences += 1;
            self.sentence_active = false;

            let sentence = self.dispatch();
            if sentence.is_some() {
                self.stats.parsed_sentences += 1;
            }
            return sentence;
        }

        if self.char_count > MAX_SENTENCE_CHARS {
            debug!("NMEA sentence exceeded {} chars, abandoned", MAX_SENTENCE_CHARS);
            self.stats.abandoned += 1;
            self.sentence_active = false;
        }

        None
    }

    /// Routes a clean sentence to its field extractor by the type tag that
    /// follows the two-letter talker id.
    fn dispatch(&self) -> Option<Sentence> {
        match self.segments.first()?.get(2..)? {
            "VTG" => self.parse_vtg().map(Sentence::Track),
            "GLL" => self.parse_gll().map(Sentence::Position),
            other => {
                debug!("NMEA sentence type '{}' not supported", other);
                None
            }
        }
    }

    fn field(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    fn parse_vtg(&self) -> Option<TrackReport> {
        let course_deg = parse_finite(self.field(1)?)?;
        let speed_knots = parse_finite(self.field(5)?)?;

        Some(TrackReport {
            course_deg,
            speed_knots,
        })
    }

    fn parse_gll(&self) -> Option<PositionReport> {
        let utc = parse_utc(self.field(5)?, self.local_offset_hours)?;

        if self.field(6)? != "A" {
            return Some(PositionReport { utc, fix: None });
        }

        let lat_field = self.field(1)?;
        let lat_hemi = self.field(2)?;
        let lon_field = self.field(3)?;
        let lon_hemi = self.field(4)?;

        if !HEMISPHERES.contains(&lat_hemi) || !HEMISPHERES.contains(&lon_hemi) {
            return None;
        }

        let latitude = convert_dm_dd(lat_field.get(..2)?, lat_field.get(2..)?, lat_hemi)?;
        let longitude = convert_dm_dd(lon_field.get(..3)?, lon_field.get(3..)?, lon_hemi)?;

        Some(PositionReport {
            utc,
            fix: Some(Position::new(latitude, longitude)),
        })
    }
}

fn parse_finite(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn parse_utc(field: &str, local_offset_hours: i32) -> Option<UtcTime> {
    if field.is_empty() {
        // receiver has no time yet
        return Some(UtcTime::default());
    }

    let hours: i32 = field.get(..2)?.parse().ok()?;
    let minutes: u32 = field.get(2..4)?.parse().ok()?;
    let seconds = parse_finite(field.get(4..)?)?;

    Some(UtcTime {
        hours: hours + local_offset_hours,
        minutes,
        seconds,
    })
}

/// Converts NMEA degrees + decimal minutes to signed decimal degrees.
///
/// The fractional part is built by gluing the minute digits together,
/// integer-dividing by 6 and writing the quotient after the decimal point:
/// `49` + `16.45` gives `1645 / 6 = 274`, so `49.274`. This truncates, and
/// drops leading zeros of the quotient (`05.10` becomes `.85`), which makes
/// the position hunt slightly around a target point. Downstream tuning
/// assumes exactly this behavior.
fn convert_dm_dd(degrees: &str, minutes: &str, hemisphere: &str) -> Option<f64> {
    let mut degree: i64 = degrees.parse().ok()?;

    let (whole, fraction) = minutes.split_once('.')?;
    if fraction.contains('.') {
        return None;
    }
    let digits = format!("{}{}", whole, fraction);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let degree_decimal = digits.parse::<u64>().ok()? / 6;

    if hemisphere == "S" || hemisphere == "W" {
        degree = -degree;
    }

    format!("{}.{}", degree, degree_decimal).parse().ok()
}
