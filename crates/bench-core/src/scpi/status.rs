//! Decoding of the power-supply system status word.
//!
//! The instrument answers its status query with a hex string whose bits are:
//!
//! | bits | field           | 0           | 1        |
//! |------|-----------------|-------------|----------|
//! | 0    | ch1 regulation  | CV          | CC       |
//! | 1    | ch2 regulation  | CV          | CC       |
//! | 2–3  | operation mode  | `01` Independent, `10` Parallel, else Unknown ||
//! | 4    | ch1 output      | OFF         | ON       |
//! | 5    | ch2 output      | OFF         | ON       |
//! | 6    | ch1 timer       | OFF         | ON       |
//! | 7    | ch2 timer       | OFF         | ON       |
//! | 8    | ch1 display     | Digital     | Waveform |
//! | 9    | ch2 display     | Digital     | Waveform |

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// The status text was not valid hexadecimal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid hex status word {input:?}")]
pub struct StatusParseError {
    pub input: String,
}

/// Output channel of a two-channel supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    One,
    Two,
}

impl Channel {
    fn offset(self) -> u32 {
        match self {
            Channel::One => 0,
            Channel::Two => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegulationMode {
    #[serde(rename = "CV")]
    ConstantVoltage,
    #[serde(rename = "CC")]
    ConstantCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationMode {
    Independent,
    Parallel,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Switch {
    Off,
    On,
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayMode {
    Digital,
    Waveform,
}

/// A decoded status bitfield.  Immutable value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(u32);

const OUTPUT_SHIFT: u32 = 4;
const TIMER_SHIFT: u32 = 6;
const DISPLAY_SHIFT: u32 = 8;
const MODE_SHIFT: u32 = 2;
const MODE_MASK: u32 = 0b11;

impl StatusWord {
    /// Parses the instrument's hex status text.
    ///
    /// Hex digits are case-insensitive; surrounding whitespace and a `0x`
    /// prefix are accepted.  Words of any width are accepted; only the low
    /// 32 bits are kept.
    ///
    /// # Errors
    ///
    /// Returns [`StatusParseError`] for empty or non-hex input.
    pub fn decode(hex: &str) -> Result<Self, StatusParseError> {
        let trimmed = hex.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StatusParseError {
                input: hex.to_string(),
            });
        }
        // 8 hex digits fill a u32
        let low = &digits[digits.len().saturating_sub(8)..];
        u32::from_str_radix(low, 16)
            .map(StatusWord)
            .map_err(|_| StatusParseError {
                input: hex.to_string(),
            })
    }

    pub fn from_bits(bits: u32) -> Self {
        StatusWord(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    fn bit(self, n: u32) -> bool {
        self.0 & (1 << n) != 0
    }

    pub fn regulation(self, channel: Channel) -> RegulationMode {
        if self.bit(channel.offset()) {
            RegulationMode::ConstantCurrent
        } else {
            RegulationMode::ConstantVoltage
        }
    }

    pub fn operation_mode(self) -> OperationMode {
        match (self.0 >> MODE_SHIFT) & MODE_MASK {
            0b01 => OperationMode::Independent,
            0b10 => OperationMode::Parallel,
            _ => OperationMode::Unknown,
        }
    }

    pub fn output(self, channel: Channel) -> Switch {
        self.bit(OUTPUT_SHIFT + channel.offset()).into()
    }

    pub fn timer(self, channel: Channel) -> Switch {
        self.bit(TIMER_SHIFT + channel.offset()).into()
    }

    pub fn display(self, channel: Channel) -> DisplayMode {
        if self.bit(DISPLAY_SHIFT + channel.offset()) {
            DisplayMode::Waveform
        } else {
            DisplayMode::Digital
        }
    }

    /// Every field at once, in a serializable form.
    pub fn decoded(self) -> DecodedStatus {
        DecodedStatus {
            ch1_mode: self.regulation(Channel::One),
            ch2_mode: self.regulation(Channel::Two),
            operation_mode: self.operation_mode(),
            ch1_output: self.output(Channel::One),
            ch2_output: self.output(Channel::Two),
            ch1_timer: self.timer(Channel::One),
            ch2_timer: self.timer(Channel::Two),
            ch1_display: self.display(Channel::One),
            ch2_display: self.display(Channel::Two),
        }
    }
}

impl FromStr for StatusWord {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusWord::decode(s)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Flat view of a [`StatusWord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodedStatus {
    pub ch1_mode: RegulationMode,
    pub ch2_mode: RegulationMode,
    pub operation_mode: OperationMode,
    pub ch1_output: Switch,
    pub ch2_output: Switch,
    pub ch1_timer: Switch,
    pub ch2_timer: Switch,
    pub ch1_display: DisplayMode,
    pub ch2_display: DisplayMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> DecodedStatus {
        StatusWord::decode("00").expect("decode").decoded()
    }

    #[test]
    fn test_decode_zero_gives_lowest_defaults() {
        // Act
        let status = baseline();

        // Assert
        assert_eq!(status.ch1_mode, RegulationMode::ConstantVoltage);
        assert_eq!(status.ch2_mode, RegulationMode::ConstantVoltage);
        assert_eq!(status.operation_mode, OperationMode::Unknown);
        assert_eq!(status.ch1_output, Switch::Off);
        assert_eq!(status.ch2_output, Switch::Off);
        assert_eq!(status.ch1_timer, Switch::Off);
        assert_eq!(status.ch2_timer, Switch::Off);
        assert_eq!(status.ch1_display, DisplayMode::Digital);
        assert_eq!(status.ch2_display, DisplayMode::Digital);
    }

    #[test]
    fn test_decode_bit_zero_only_changes_ch1_mode() {
        // Act
        let status = StatusWord::decode("01").expect("decode").decoded();

        // Assert
        let expected = DecodedStatus {
            ch1_mode: RegulationMode::ConstantCurrent,
            ..baseline()
        };
        assert_eq!(status, expected);
    }

    #[test]
    fn test_decode_each_single_bit_field() {
        let cases: [(&str, fn(DecodedStatus) -> bool); 8] = [
            ("02", |s| s.ch2_mode == RegulationMode::ConstantCurrent),
            ("04", |s| s.operation_mode == OperationMode::Independent),
            ("10", |s| s.ch1_output == Switch::On),
            ("20", |s| s.ch2_output == Switch::On),
            ("40", |s| s.ch1_timer == Switch::On),
            ("80", |s| s.ch2_timer == Switch::On),
            ("100", |s| s.ch1_display == DisplayMode::Waveform),
            ("200", |s| s.ch2_display == DisplayMode::Waveform),
        ];
        for (hex, check) in cases {
            let status = StatusWord::decode(hex).expect("decode").decoded();
            assert!(check(status), "field for {hex} not set");
        }
    }

    #[test]
    fn test_operation_mode_two_bit_field() {
        assert_eq!(
            StatusWord::from_bits(0b0100).operation_mode(),
            OperationMode::Independent
        );
        assert_eq!(
            StatusWord::from_bits(0b1000).operation_mode(),
            OperationMode::Parallel
        );
        assert_eq!(
            StatusWord::from_bits(0b1100).operation_mode(),
            OperationMode::Unknown
        );
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        let lower = StatusWord::decode("3ff").expect("decode");
        let upper = StatusWord::decode("3FF").expect("decode");
        assert_eq!(lower, upper);
        assert_eq!(lower.bits(), 0x3FF);
    }

    #[test]
    fn test_decode_accepts_prefix_and_whitespace() {
        assert_eq!(StatusWord::decode(" 0x0051\r\n").expect("decode").bits(), 0x51);
    }

    #[test]
    fn test_decode_rejects_invalid_hex() {
        assert!(StatusWord::decode("xyz").is_err());
        assert!(StatusWord::decode("").is_err());
        assert!(StatusWord::decode("0x").is_err());
        assert!(StatusWord::decode("+1").is_err());
        assert!(StatusWord::decode("1000000000000000000g").is_err());
    }

    #[test]
    fn test_decode_accepts_words_wider_than_32_bits() {
        // Arrange
        let narrow = StatusWord::decode("1").expect("decode");

        // Act
        let wide = StatusWord::decode("100000001").expect("decode");
        let very_wide = StatusWord::decode("0xFFFF0000000000000215").expect("decode");

        // Assert
        assert_eq!(wide, narrow);
        assert_eq!(wide.regulation(Channel::One), RegulationMode::ConstantCurrent);
        assert_eq!(very_wide.bits(), 0x215);
    }

    #[test]
    fn test_typical_supply_status() {
        // ch1 on in CC, independent mode, ch2 waveform display
        let word: StatusWord = "0215".parse().expect("decode");
        assert_eq!(word.regulation(Channel::One), RegulationMode::ConstantCurrent);
        assert_eq!(word.operation_mode(), OperationMode::Independent);
        assert_eq!(word.output(Channel::One), Switch::On);
        assert_eq!(word.output(Channel::Two), Switch::Off);
        assert_eq!(word.display(Channel::Two), DisplayMode::Waveform);
    }
}
