//! Catalog identifier validation (ISBN-10 / ISBN-13)

/// Strip separators and normalize a trailing check character
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// True when `raw` is a well-formed ISBN-10 or ISBN-13 with a valid checksum
pub fn is_valid_isbn(raw: &str) -> bool {
    let isbn = normalize_isbn(raw);
    is_isbn10(&isbn) || is_isbn13(&isbn)
}

fn is_isbn10(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 10 {
        return false;
    }

    let mut sum = 0u32;
    for (idx, byte) in bytes.iter().enumerate() {
        let value = match byte {
            b'0'..=b'9' => u32::from(byte - b'0'),
            b'X' if idx == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - idx as u32);
    }
    sum % 11 == 0
}

fn is_isbn13(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    if bytes.len() != 13 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    // Bookland prefixes only
    if !(isbn.starts_with("978") || isbn.starts_with("979")) {
        return false;
    }

    let sum: u32 = bytes
        .iter()
        .enumerate()
        .map(|(idx, byte)| {
            let digit = u32::from(byte - b'0');
            if idx % 2 == 0 { digit } else { digit * 3 }
        })
        .sum();
    sum % 10 == 0
}
