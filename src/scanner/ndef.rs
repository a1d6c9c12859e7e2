//! Minimal NDEF handling for identifier tags
//!
//! Tags carry the catalog identifier as a single NFC Forum Well-Known Text
//! record. Only what the lending desk needs is implemented: walking the
//! records of a message, extracting the first Text record and encoding one.

use thiserror::Error;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const TNF_WELL_KNOWN: u8 = 0x01;
const TEXT_TYPE: &[u8] = b"T";

const STATUS_UTF16: u8 = 0x80;
const STATUS_LANG_LEN: u8 = 0x3F;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NdefError {
    #[error("message truncated at byte {0}")]
    Truncated(usize),

    #[error("chunked records are not supported")]
    Chunked,

    #[error("text record payload is malformed")]
    MalformedText,

    #[error("text record payload is too long ({0} bytes)")]
    TooLong(usize),
}

/// A single parsed record, borrowing from the message buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    pub tnf: u8,
    pub record_type: &'a [u8],
    pub id: &'a [u8],
    pub payload: &'a [u8],
}

impl Record<'_> {
    pub fn is_text(&self) -> bool {
        self.tnf == TNF_WELL_KNOWN && self.record_type == TEXT_TYPE
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], NdefError> {
        let end = self.pos.checked_add(len).ok_or(NdefError::Truncated(self.pos))?;
        let slice = self.buf.get(self.pos..end).ok_or(NdefError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, NdefError> {
        Ok(self.take(1)?[0])
    }
}

/// Parse every record of an NDEF message
pub fn parse_message(message: &[u8]) -> Result<Vec<Record<'_>>, NdefError> {
    let mut cursor = Cursor { buf: message, pos: 0 };
    let mut records = Vec::new();

    while cursor.pos < message.len() {
        let header = cursor.byte()?;
        if header & FLAG_CF != 0 {
            return Err(NdefError::Chunked);
        }

        let type_len = cursor.byte()? as usize;
        let payload_len = if header & FLAG_SR != 0 {
            cursor.byte()? as usize
        } else {
            let raw = cursor.take(4)?;
            u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
        };
        let id_len = if header & FLAG_IL != 0 {
            cursor.byte()? as usize
        } else {
            0
        };

        let record_type = cursor.take(type_len)?;
        let id = cursor.take(id_len)?;
        let payload = cursor.take(payload_len)?;

        records.push(Record {
            tnf: header & TNF_MASK,
            record_type,
            id,
            payload,
        });

        if header & FLAG_ME != 0 {
            break;
        }
    }

    Ok(records)
}

/// Decode the text of a Well-Known Text record payload
pub fn decode_text_payload(payload: &[u8]) -> Result<String, NdefError> {
    let (&status, rest) = payload.split_first().ok_or(NdefError::MalformedText)?;
    let lang_len = (status & STATUS_LANG_LEN) as usize;
    let text = rest.get(lang_len..).ok_or(NdefError::MalformedText)?;

    if status & STATUS_UTF16 != 0 {
        if text.len() % 2 != 0 {
            return Err(NdefError::MalformedText);
        }
        let units: Vec<u16> = text
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| NdefError::MalformedText)
    } else {
        String::from_utf8(text.to_vec()).map_err(|_| NdefError::MalformedText)
    }
}

/// Text of the first Text record in `message`, if any
pub fn first_text(message: &[u8]) -> Result<Option<String>, NdefError> {
    for record in parse_message(message)? {
        if record.is_text() {
            return decode_text_payload(record.payload).map(Some);
        }
    }
    Ok(None)
}

/// Encode `text` as a one-record message (UTF-8, language `en`)
pub fn encode_text_message(text: &str) -> Result<Vec<u8>, NdefError> {
    const LANG: &[u8] = b"en";

    let payload_len = 1 + LANG.len() + text.len();
    let short = payload_len <= u8::MAX as usize;
    if u32::try_from(payload_len).is_err() {
        return Err(NdefError::TooLong(payload_len));
    }

    let mut header = FLAG_MB | FLAG_ME | TNF_WELL_KNOWN;
    if short {
        header |= FLAG_SR;
    }

    let mut message = Vec::with_capacity(payload_len + 7);
    message.push(header);
    message.push(TEXT_TYPE.len() as u8);
    if short {
        message.push(payload_len as u8);
    } else {
        message.extend_from_slice(&(payload_len as u32).to_be_bytes());
    }
    message.extend_from_slice(TEXT_TYPE);
    message.push(LANG.len() as u8);
    message.extend_from_slice(LANG);
    message.extend_from_slice(text.as_bytes());
    Ok(message)
}
