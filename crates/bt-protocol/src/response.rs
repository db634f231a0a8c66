//! Response line classification
//!
//! Each session step carries an ordered table of [`ResponseRule`]s. A line
//! is checked against the rules in order; the first rule whose pattern
//! matches and whose handler accepts the payload wins. Lines no rule
//! accepts are ignored by the caller.
//!
//! Lengths are measured on the line content after the trailing `\r` has
//! been trimmed, so `CONNECT <addr>` (21 bytes on the wire including the
//! carriage return) is an exact length of 20.

use crate::address::BtAddress;
use crate::discovery::ServiceName;
use crate::line::Line;
use crate::wire::{ADDRESS_LEN, NAME_MAX};

/// Length requirement of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Any,
    Exact(usize),
    AtMost(usize),
}

/// Literal prefix plus a length requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinePattern {
    pub prefix: &'static str,
    pub length: LengthRule,
}

impl LinePattern {
    pub const fn new(prefix: &'static str, length: LengthRule) -> Self {
        Self { prefix, length }
    }

    pub fn matches(&self, line: &Line) -> bool {
        // The true length of a truncated line is unknown
        let length_ok = match self.length {
            LengthRule::Any => true,
            LengthRule::Exact(len) => !line.is_truncated() && line.len() == len,
            LengthRule::AtMost(len) => !line.is_truncated() && line.len() <= len,
        };
        length_ok && line.starts_with(self.prefix)
    }
}

/// Recognised module responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    InquiryFound(BtAddress),
    InquiryComplete,
    /// One service record; `None` when it carries no quoted name
    ServiceRecord(Option<ServiceName>),
    ServiceComplete,
    LocalAddress(BtAddress),
    LocalName(String),
    Connect(BtAddress),
    PeerReady,
    NoCarrier,
}

/// One table entry: pattern plus payload parser
#[derive(Clone, Copy)]
pub struct ResponseRule {
    pub pattern: LinePattern,
    pub handler: fn(&Line) -> Option<Response>,
}

/// Classify `line` against `rules`, first accepted match wins
pub fn classify(rules: &[ResponseRule], line: &Line) -> Option<Response> {
    rules
        .iter()
        .filter(|rule| rule.pattern.matches(line))
        .find_map(|rule| (rule.handler)(line))
}

/// Patterns of the module's response lines
pub mod patterns {
    use super::{LengthRule, LinePattern};

    /// `+BTINQ: <addr>,<class of device>`
    pub const INQUIRY_FOUND: LinePattern = LinePattern::new("+BTINQ: ", LengthRule::Exact(28));
    pub const INQUIRY_COMPLETE: LinePattern =
        LinePattern::new("+BTINQ: COMPLETE", LengthRule::Any);
    pub const SERVICE_RECORD: LinePattern = LinePattern::new("+BTSDP: ", LengthRule::Any);
    pub const SERVICE_COMPLETE: LinePattern =
        LinePattern::new("+BTSDP: COMPLETE", LengthRule::Any);
    /// `+BTBDA: <addr>`
    pub const LOCAL_ADDRESS: LinePattern = LinePattern::new("+BTBDA: ", LengthRule::Exact(20));
    /// `+BTLNM: "<name>"`
    pub const LOCAL_NAME: LinePattern = LinePattern::new("+BTLNM: \"", LengthRule::AtMost(25));
    /// `CONNECT <addr>`
    pub const CONNECT: LinePattern = LinePattern::new("CONNECT ", LengthRule::Exact(20));
    pub const NO_CARRIER: LinePattern = LinePattern::new("NO CARRIER", LengthRule::Any);
    pub const PEER_READY: LinePattern =
        LinePattern::new(crate::connection::READY_LINE, LengthRule::Any);
}

fn address_at(line: &Line, offset: usize) -> Option<BtAddress> {
    BtAddress::parse(line.field(offset, ADDRESS_LEN)?).ok()
}

fn inquiry_found(line: &Line) -> Option<Response> {
    address_at(line, patterns::INQUIRY_FOUND.prefix.len()).map(Response::InquiryFound)
}

fn inquiry_complete(_: &Line) -> Option<Response> {
    Some(Response::InquiryComplete)
}

fn service_record(line: &Line) -> Option<Response> {
    Some(Response::ServiceRecord(parse_service_name(
        line.tail(patterns::SERVICE_RECORD.prefix.len()),
    )))
}

fn service_complete(_: &Line) -> Option<Response> {
    Some(Response::ServiceComplete)
}

fn local_address(line: &Line) -> Option<Response> {
    address_at(line, patterns::LOCAL_ADDRESS.prefix.len()).map(Response::LocalAddress)
}

fn local_name(line: &Line) -> Option<Response> {
    let rest = line.tail(patterns::LOCAL_NAME.prefix.len());
    let end = rest.iter().position(|&b| b == b'"').unwrap_or(rest.len());
    let name = std::str::from_utf8(&rest[..end]).ok()?;
    Some(Response::LocalName(name.to_string()))
}

fn connect(line: &Line) -> Option<Response> {
    address_at(line, patterns::CONNECT.prefix.len()).map(Response::Connect)
}

fn no_carrier(_: &Line) -> Option<Response> {
    Some(Response::NoCarrier)
}

fn peer_ready(_: &Line) -> Option<Response> {
    Some(Response::PeerReady)
}

/// First quoted string in `payload`, cut at [`NAME_MAX`] characters
pub fn parse_service_name(payload: &[u8]) -> Option<ServiceName> {
    let open = payload.iter().position(|&b| b == b'"')?;
    let quoted = &payload[open + 1..];

    let limit = quoted.len().min(NAME_MAX);
    let end = quoted[..limit]
        .iter()
        .position(|&b| b == b'"')
        .unwrap_or(limit);
    let truncated = quoted.get(end) != Some(&b'"');

    Some(ServiceName {
        name: String::from_utf8_lossy(&quoted[..end]).into_owned(),
        truncated,
    })
}

/// Rule tables, one per session step
pub mod tables {
    use super::*;

    const fn rule(pattern: LinePattern, handler: fn(&Line) -> Option<Response>) -> ResponseRule {
        ResponseRule { pattern, handler }
    }

    pub const INQUIRY: &[ResponseRule] = &[
        rule(patterns::INQUIRY_FOUND, inquiry_found),
        rule(patterns::INQUIRY_COMPLETE, inquiry_complete),
    ];

    /// The completion sentinel shares the record prefix, so it goes first
    pub const SERVICE_DISCOVERY: &[ResponseRule] = &[
        rule(patterns::SERVICE_COMPLETE, service_complete),
        rule(patterns::SERVICE_RECORD, service_record),
    ];

    pub const LOCAL_ADDRESS: &[ResponseRule] = &[rule(patterns::LOCAL_ADDRESS, local_address)];

    pub const LOCAL_NAME: &[ResponseRule] = &[rule(patterns::LOCAL_NAME, local_name)];

    pub const INCOMING: &[ResponseRule] = &[rule(patterns::CONNECT, connect)];

    pub const CLIENT_CONNECT: &[ResponseRule] = &[
        rule(patterns::CONNECT, connect),
        rule(patterns::NO_CARRIER, no_carrier),
    ];

    pub const PEER_READY: &[ResponseRule] = &[
        rule(patterns::PEER_READY, peer_ready),
        rule(patterns::NO_CARRIER, no_carrier),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> Line {
        Line::new(text)
    }

    #[test]
    fn test_inquiry_found_requires_exact_length() {
        let found = line("+BTINQ: 0012F3A1B2C3,0x5A020");
        assert_eq!(found.len(), 28);
        assert_eq!(
            classify(tables::INQUIRY, &found),
            Some(Response::InquiryFound(
                BtAddress::parse("0012F3A1B2C3").unwrap()
            ))
        );

        // Garbled: one byte short
        assert_eq!(classify(tables::INQUIRY, &line("+BTINQ: 0012F3A1B2C3,0x5A02")), None);
        assert_eq!(
            classify(tables::INQUIRY, &line("+BTINQ: COMPLETE")),
            Some(Response::InquiryComplete)
        );
    }

    #[test]
    fn test_non_hex_address_is_ignored() {
        assert_eq!(classify(tables::INCOMING, &line("CONNECT 0012F3A1B2ZZ")), None);
        assert!(classify(tables::INCOMING, &line("CONNECT 0012F3A1B2C3")).is_some());
    }

    #[test]
    fn test_service_table_order() {
        assert_eq!(
            classify(tables::SERVICE_DISCOVERY, &line("+BTSDP: COMPLETE")),
            Some(Response::ServiceComplete)
        );
        assert_eq!(
            classify(tables::SERVICE_DISCOVERY, &line("+BTSDP: 0x1101, \"PingPongServer\"")),
            Some(Response::ServiceRecord(Some(ServiceName {
                name: "PingPongServer".into(),
                truncated: false
            })))
        );
        assert_eq!(
            classify(tables::SERVICE_DISCOVERY, &line("+BTSDP: 0x1101")),
            Some(Response::ServiceRecord(None))
        );
    }

    #[test]
    fn test_service_name_truncation() {
        let name = parse_service_name(b" \"A Very Long Service Name\"").unwrap();
        assert_eq!(name.name, "A Very Long Serv");
        assert!(name.truncated);

        let name = parse_service_name(b"\"Exactly16CharsXX\"").unwrap();
        assert_eq!(name.name.len(), 16);
        assert!(!name.truncated);

        // Line ended before the closing quote
        let name = parse_service_name(b"\"Serial").unwrap();
        assert_eq!(name.name, "Serial");
        assert!(name.truncated);
    }

    #[test]
    fn test_local_queries() {
        assert_eq!(
            classify(tables::LOCAL_ADDRESS, &line("+BTBDA: 0012f3000001")),
            Some(Response::LocalAddress(
                BtAddress::parse("0012F3000001").unwrap()
            ))
        );
        assert_eq!(
            classify(tables::LOCAL_NAME, &line("+BTLNM: \"Console 2138\"")),
            Some(Response::LocalName("Console 2138".into()))
        );
        // Too long to be a name report
        assert_eq!(
            classify(tables::LOCAL_NAME, &line("+BTLNM: \"0123456789ABCDEFGH\"")),
            None
        );
    }

    #[test]
    fn test_no_carrier_and_ready() {
        assert_eq!(
            classify(tables::PEER_READY, &line("LETS START PLAYING")),
            Some(Response::PeerReady)
        );
        assert_eq!(
            classify(tables::PEER_READY, &line("NO CARRIER")),
            Some(Response::NoCarrier)
        );
        assert_eq!(classify(tables::PEER_READY, &line("")), None);
    }
}
