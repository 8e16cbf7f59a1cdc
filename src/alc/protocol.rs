//! AT command wire format for the ALC parameter block.
//!
//! ```text
//! host -> device   AT+PARAM?\r\n
//! device -> host   +PARAM:ALC,1,1,1,32000,...,255\r\nOK\r\n
//!
//! host -> device   AT+PARAM=ALC,1,1,1,32000,...,255\r\n
//! device -> host   OK\r\n | ERROR\r\n
//! ```
//!
//! Everything here is pure string handling; the timed exchange lives in
//! [`super::channel`].

use super::params::AlcParameterRecord;
use crate::error::ProtocolError;

/// Parameter query, including terminator.
pub const GET_COMMAND: &str = "AT+PARAM?\r\n";
/// Prefix of a parameter set command.
pub const SET_PREFIX: &str = "AT+PARAM=ALC,";
/// Prefix of the parameter line in a query response.
pub const PARAM_LINE_PREFIX: &str = "+PARAM:ALC,";
/// Success token.
pub const OK_TOKEN: &str = "OK";
/// Rejection token.
pub const ERROR_TOKEN: &str = "ERROR";
/// Command line terminator.
pub const TERMINATOR: &str = "\r\n";

/// Terminal token found in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// `OK` was seen
    Ok,
    /// `ERROR` was seen and `OK` was not
    Error,
}

/// Look for a terminal token anywhere in the accumulated response.
///
/// `OK` takes precedence when both are present.
pub fn find_terminal(response: &str) -> Option<Terminal> {
    if response.contains(OK_TOKEN) {
        Some(Terminal::Ok)
    } else if response.contains(ERROR_TOKEN) {
        Some(Terminal::Error)
    } else {
        None
    }
}

/// Encode a set command for `record`, terminator included.
///
/// Values are written exactly as stored, comma separated.
pub fn format_set_command(record: &AlcParameterRecord) -> String {
    format!("{SET_PREFIX}{}{TERMINATOR}", record.values().join(","))
}

/// Decode a set command line back into a record.
pub fn parse_set_command(line: &str) -> Result<AlcParameterRecord, ProtocolError> {
    let line = line.trim();
    let body = line
        .strip_prefix(SET_PREFIX)
        .ok_or_else(|| ProtocolError::MissingSetPrefix {
            line: line.to_string(),
        })?;
    AlcParameterRecord::from_fields(body.split(','))
}

/// Encode the device's answer to [`GET_COMMAND`], as a device would send it.
pub fn format_param_response(record: &AlcParameterRecord) -> String {
    format!(
        "{PARAM_LINE_PREFIX}{}{TERMINATOR}{OK_TOKEN}{TERMINATOR}",
        record.values().join(",")
    )
}

/// First response line starting with [`PARAM_LINE_PREFIX`], trimmed.
pub fn find_param_line(response: &str) -> Option<&str> {
    response
        .split('\n')
        .map(str::trim)
        .find(|line| line.starts_with(PARAM_LINE_PREFIX))
}

/// Parse a query response into a record.
///
/// Only the first matching line is used; echo lines, blank lines and the
/// trailing `OK` are ignored. Each value is trimmed.
pub fn parse_get_response(response: &str) -> Result<AlcParameterRecord, ProtocolError> {
    let line = find_param_line(response).ok_or_else(|| ProtocolError::MissingParamLine {
        response: response.trim().to_string(),
    })?;
    let body = &line[PARAM_LINE_PREFIX.len()..];
    AlcParameterRecord::from_fields(body.split(','))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alc::params::{AlcField, FIELD_COUNT};

    #[test]
    fn default_set_command_is_exact() {
        let command = format_set_command(&AlcParameterRecord::defaults());
        assert_eq!(
            command,
            "AT+PARAM=ALC,1,1,1,32000,8000,64000,1,1,0,1,-57,1,0,8000,0,33,0,0,0,0,0,0,0,0,255\r\n"
        );
    }

    #[test]
    fn set_command_parses_back() {
        let record = AlcParameterRecord::defaults()
            .with_value(AlcField::Mode, 0)
            .with_value(AlcField::Group, 2);
        let parsed = parse_set_command(&format_set_command(&record)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn get_response_skips_echo_and_whitespace() {
        let response = "AT+PARAM?\r\n\r\n+PARAM:ALC, 1,1,0,100,200,300,1,1,0,1,-60,1,0,16000,2,30,-4,1,10,20,30,40,1,2,3 \r\nOK\r\n";
        let record = parse_get_response(response).unwrap();
        assert_eq!(record.get(AlcField::Enable), "1");
        assert_eq!(record.value(AlcField::Mode), Some(0));
        assert_eq!(record.value(AlcField::ApproxRateHz), Some(16_000));
        assert_eq!(record.get(AlcField::Group), "3");
    }

    #[test]
    fn first_param_line_wins() {
        let first = AlcParameterRecord::defaults();
        let second = first.clone().with_value(AlcField::Group, 0);
        let response = format!(
            "{}{}",
            format_param_response(&first),
            format_param_response(&second)
        );
        assert_eq!(parse_get_response(&response).unwrap(), first);
    }

    #[test]
    fn short_param_line_is_a_field_count_error() {
        let values = vec!["1"; FIELD_COUNT - 1].join(",");
        let response = format!("+PARAM:ALC,{values}\r\nOK\r\n");
        assert_eq!(
            parse_get_response(&response),
            Err(ProtocolError::FieldCount {
                expected: FIELD_COUNT,
                actual: FIELD_COUNT - 1,
                line: values,
            })
        );
    }

    #[test]
    fn missing_param_line() {
        assert_eq!(
            parse_get_response("\r\nOK\r\n"),
            Err(ProtocolError::MissingParamLine {
                response: "OK".into()
            })
        );
    }

    #[test]
    fn set_command_without_prefix() {
        let err = parse_set_command("AT+PARAM=AGC,1,1\r\n").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingSetPrefix {
                line: "AT+PARAM=AGC,1,1".into()
            }
        );
        assert!(err.to_string().contains("AT+PARAM=ALC,"));
        assert!(!err.to_string().contains("+PARAM:ALC,"));
    }

    #[test]
    fn terminal_detection() {
        assert_eq!(find_terminal("+PARAM:ALC,1"), None);
        assert_eq!(find_terminal("\r\nERROR\r\n"), Some(Terminal::Error));
        assert_eq!(find_terminal("OK\r\n"), Some(Terminal::Ok));
        assert_eq!(find_terminal("ERROR\r\nOK\r\n"), Some(Terminal::Ok));
    }
}
