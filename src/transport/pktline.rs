//! pkt-line framing and ref advertisement parsing.
//!
//! A pkt-line is a 4-digit hex length (which counts the 4 length bytes
//! themselves) followed by payload; `0000` is a flush packet. A ref
//! advertisement is an optional `# service=<name>` preamble ended by a flush,
//! then one `<oid> <ref>` line per ref (the first carrying capabilities
//! after a NUL byte), then a flush.

use std::io::{self, Read};

use super::{RemoteRef, Service, TransportError};

/// Largest pkt-line payload git will send (65520 total minus the header).
pub const MAX_PKT_PAYLOAD: usize = 65516;

/// One decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Flush,
    Data(Vec<u8>),
}

/// Reads pkt-lines from a byte stream.
pub struct PktLineReader<R> {
    inner: R,
}

impl<R: Read> PktLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next packet, or `None` at a clean end of stream.
    pub fn next_packet(&mut self) -> io::Result<Option<Packet>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            let n = self.inner.read(&mut header[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated pkt-line header",
                ));
            }
            filled += n;
        }

        let len = std::str::from_utf8(&header)
            .ok()
            .and_then(|s| usize::from_str_radix(s, 16).ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad pkt-line length"))?;

        match len {
            0 => Ok(Some(Packet::Flush)),
            1..=3 => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "pkt-line length too short",
            )),
            _ if len - 4 > MAX_PKT_PAYLOAD => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "pkt-line length too long",
            )),
            _ => {
                let mut payload = vec![0u8; len - 4];
                self.inner.read_exact(&mut payload)?;
                Ok(Some(Packet::Data(payload)))
            }
        }
    }
}

/// Parse a complete advertisement.
///
/// `smart_http` expects the `# service=` preamble that smart HTTP servers
/// send; SSH servers start directly with the ref list.
pub fn parse_advertisement<R: Read>(
    reader: R,
    service: Service,
    smart_http: bool,
) -> Result<Vec<RemoteRef>, TransportError> {
    let invalid = || TransportError::protocol(format!("invalid advertisement of {}", service));
    let mut packets = PktLineReader::new(reader);
    let mut next = || packets.next_packet().map_err(|e| invalid().caused_by(e));

    if smart_http {
        let expected = format!("# service={}", service);
        match next()? {
            Some(Packet::Data(line)) if trim_line(&line) == expected.as_bytes() => {}
            _ => return Err(invalid()),
        }
        // Some servers omit the flush after the preamble.
        match next()? {
            Some(Packet::Flush) => {}
            Some(Packet::Data(line)) => return parse_refs(Some(line), next, service),
            None => return Err(invalid()),
        }
    }

    match next()? {
        Some(Packet::Data(line)) => parse_refs(Some(line), next, service),
        // An empty ref list without capabilities: nothing advertised.
        Some(Packet::Flush) => Ok(Vec::new()),
        None => Err(invalid()),
    }
}

fn parse_refs(
    first: Option<Vec<u8>>,
    mut next: impl FnMut() -> Result<Option<Packet>, TransportError>,
    service: Service,
) -> Result<Vec<RemoteRef>, TransportError> {
    let mut refs = Vec::new();
    let mut pending = first;
    let mut is_first = true;

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => match next()? {
                Some(Packet::Data(line)) => line,
                Some(Packet::Flush) => return Ok(refs),
                None => {
                    return Err(TransportError::protocol(format!(
                        "invalid advertisement of {}: missing flush",
                        service
                    )))
                }
            },
        };

        let line = trim_line(&line);
        if let Some(message) = line.strip_prefix(b"ERR ") {
            return Err(TransportError::protocol(format!(
                "remote error: {}",
                String::from_utf8_lossy(message)
            )));
        }

        // Capabilities follow a NUL on the first line only.
        let line = if is_first {
            line.split(|b| *b == 0).next().unwrap_or(line)
        } else {
            line
        };
        is_first = false;

        let text = std::str::from_utf8(line).map_err(|_| {
            TransportError::protocol(format!("invalid advertisement of {}", service))
        })?;
        let (oid, name) = text.split_once(' ').ok_or_else(|| {
            TransportError::protocol(format!("invalid advertisement of {}", service))
        })?;
        if oid.len() < 40 || !oid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TransportError::protocol(format!(
                "invalid advertisement of {}",
                service
            )));
        }

        if name == "capabilities^{}" {
            continue;
        }
        refs.push(RemoteRef {
            oid: oid.to_string(),
            name: name.to_string(),
        });
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

/// Encode one pkt-line.
#[cfg(test)]
pub fn encode(payload: &str) -> String {
    format!("{:04x}{}", payload.len() + 4, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID_A: &str = "1111111111111111111111111111111111111111";
    const OID_B: &str = "2222222222222222222222222222222222222222";

    fn smart_body(service: Service, lines: &[String]) -> Vec<u8> {
        let mut body = encode(&format!("# service={}\n", service));
        body.push_str("0000");
        for line in lines {
            body.push_str(&encode(line));
        }
        body.push_str("0000");
        body.into_bytes()
    }

    #[test]
    fn parses_smart_http_advertisement() {
        let body = smart_body(
            Service::UploadPack,
            &[
                format!("{} HEAD\0multi_ack side-band-64k\n", OID_A),
                format!("{} refs/heads/main\n", OID_A),
                format!("{} refs/tags/v1\n", OID_B),
            ],
        );
        let refs = parse_advertisement(&body[..], Service::UploadPack, true).unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].name, "HEAD");
        assert_eq!(refs[2].oid, OID_B);
    }

    #[test]
    fn empty_repository_has_no_refs() {
        let zeros = "0".repeat(40);
        let body = smart_body(
            Service::ReceivePack,
            &[format!("{} capabilities^{{}}\0report-status\n", zeros)],
        );
        let refs = parse_advertisement(&body[..], Service::ReceivePack, true).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn ssh_advertisement_has_no_preamble() {
        let mut body = encode(&format!("{} refs/heads/main\0agent=git/2\n", OID_A));
        body.push_str("0000");
        let refs = parse_advertisement(body.as_bytes(), Service::UploadPack, false).unwrap();
        assert_eq!(
            refs,
            vec![RemoteRef {
                oid: OID_A.into(),
                name: "refs/heads/main".into()
            }]
        );
    }

    #[test]
    fn html_page_is_invalid_advertisement() {
        let err = parse_advertisement(
            &b"<html><body>Sign in</body></html>"[..],
            Service::UploadPack,
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid advertisement of git-upload-pack"));
    }

    #[test]
    fn wrong_service_preamble_is_invalid() {
        let body = smart_body(Service::UploadPack, &[]);
        let err = parse_advertisement(&body[..], Service::ReceivePack, true).unwrap_err();
        assert!(err.to_string().contains("invalid advertisement of git-receive-pack"));
    }

    #[test]
    fn err_packet_surfaces_remote_message() {
        let body = encode("ERR access denied\n");
        let err = parse_advertisement(body.as_bytes(), Service::UploadPack, false).unwrap_err();
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn reader_rejects_bad_length() {
        let mut reader = PktLineReader::new(&b"zzzzdata"[..]);
        assert!(reader.next_packet().is_err());
        let mut reader = PktLineReader::new(&b"0002"[..]);
        assert!(reader.next_packet().is_err());
    }
}
