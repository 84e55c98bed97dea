/*!
    Normalization of certificate and license server payloads.

    Servers either return the raw binary blob, or an XML document with the
    blob base64-encoded inside a `<cert>` or `<ckc>` element. Callers pass
    whatever came over the wire through [`normalize`] and always get the
    binary form back.
*/

use data_encoding::BASE64;
use quick_xml::events::Event;
use tracing::trace;

/**
    Element carrying a base64 application certificate.
*/
pub const CERTIFICATE_TAG: &[u8] = b"cert";

/**
    Element carrying a base64 content key context.
*/
pub const CONTENT_KEY_TAG: &[u8] = b"ckc";

/**
    Return the binary payload carried by `payload`.

    Never fails: anything that is not a well-formed document with a
    recognized element holding valid base64 is returned unchanged.
*/
pub fn normalize(payload: &[u8]) -> Vec<u8> {
    decode_wrapped(payload).unwrap_or_else(|| payload.to_vec())
}

/**
    Decode the base64 text of the last `<cert>` or `<ckc>` element in `payload`.

    Returns `None` when `payload` is not a well-formed document, has no
    recognized element text, or that text does not decode to any bytes.
*/
pub fn decode_wrapped(payload: &[u8]) -> Option<Vec<u8>> {
    let text = capture_element_text(payload)?;
    if text.is_empty() {
        return None;
    }

    let decoded = decode_base64_lenient(&text)?;
    if decoded.is_empty() {
        return None;
    }

    trace!(
        wrapped = payload.len(),
        decoded = decoded.len(),
        "decoded base64 payload from markup"
    );
    Some(decoded)
}

fn is_recognized(local_name: &[u8]) -> bool {
    local_name == CERTIFICATE_TAG || local_name == CONTENT_KEY_TAG
}

/**
    Collect character data of the currently open recognized element.

    A recognized element restarts the capture, so the last one in the
    document wins. Returns `None` if the document is not well-formed:
    unbalanced tags, more than one root element, or character data
    outside the root.
*/
fn capture_element_text(payload: &[u8]) -> Option<String> {
    let xml = std::str::from_utf8(payload).ok()?;
    let mut reader = quick_xml::Reader::from_str(xml);

    let mut depth = 0usize;
    let mut roots = 0usize;
    // Depth of the recognized element being captured, if one is open
    let mut capturing: Option<usize> = None;
    let mut captured = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if depth == 0 {
                    roots += 1;
                    if roots > 1 {
                        return None;
                    }
                }
                depth += 1;
                if is_recognized(e.local_name().as_ref()) {
                    captured.clear();
                    capturing = Some(depth);
                }
            }
            Ok(Event::End(_)) => {
                if capturing == Some(depth) {
                    capturing = None;
                }
                depth = depth.checked_sub(1)?;
            }
            Ok(Event::Empty(ref e)) => {
                if depth == 0 {
                    roots += 1;
                    if roots > 1 {
                        return None;
                    }
                }
                if is_recognized(e.local_name().as_ref()) {
                    captured.clear();
                }
            }
            Ok(Event::Text(ref e)) if depth == 0 => {
                if !e.iter().all(u8::is_ascii_whitespace) {
                    trace!("character data outside the root element");
                    return None;
                }
            }
            Ok(Event::CData(_)) if depth == 0 => return None,
            Ok(Event::Text(ref e)) if capturing.is_some() => {
                captured.push_str(&e.unescape().ok()?);
            }
            Ok(Event::CData(ref e)) if capturing.is_some() => {
                let raw: &[u8] = e;
                captured.push_str(std::str::from_utf8(raw).ok()?);
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                trace!(%err, "payload is not well-formed markup");
                return None;
            }
            _ => {}
        }
    }

    if depth != 0 || roots == 0 {
        return None;
    }

    Some(captured)
}

/**
    Decode standard padded base64, skipping anything outside the alphabet
    (whitespace, line breaks, stray punctuation).
*/
fn decode_base64_lenient(text: &str) -> Option<Vec<u8>> {
    let filtered: Vec<u8> = text
        .bytes()
        .filter(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        .collect();

    BASE64.decode(&filtered).ok()
}
