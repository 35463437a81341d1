//! SMS segmentation.
//!
//! Splits alert text into transport-sized parts the same way handset SMS
//! managers do, so a channel realization can choose between a single send
//! and a concatenated multi-part send.
//!
//! - GSM 03.38 text: 160 septets single, 153 per part when concatenated.
//!   Characters from the extension table cost two septets.
//! - Anything outside the GSM alphabet: UCS-2, 70 single / 67 per part.

/// Single-part capacity in septets for GSM-7 text.
pub const GSM7_SINGLE: usize = 160;
/// Per-part capacity in septets for concatenated GSM-7 text.
pub const GSM7_MULTI: usize = 153;
/// Single-part capacity in UTF-16 code units for UCS-2 text.
pub const UCS2_SINGLE: usize = 70;
/// Per-part capacity in UTF-16 code units for concatenated UCS-2 text.
pub const UCS2_MULTI: usize = 67;

const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

const GSM7_EXTENSION: &str = "^{}\\[~]|€\u{000C}";

/// Character set the text will be encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsEncoding {
    Gsm7,
    Ucs2,
}

impl SmsEncoding {
    /// Pick the narrowest encoding that can carry `text`.
    pub fn detect(text: &str) -> Self {
        if text.chars().all(|c| gsm7_cost(c).is_some()) {
            SmsEncoding::Gsm7
        } else {
            SmsEncoding::Ucs2
        }
    }

    fn limits(self) -> (usize, usize) {
        match self {
            SmsEncoding::Gsm7 => (GSM7_SINGLE, GSM7_MULTI),
            SmsEncoding::Ucs2 => (UCS2_SINGLE, UCS2_MULTI),
        }
    }

    fn cost(self, c: char) -> usize {
        match self {
            SmsEncoding::Gsm7 => gsm7_cost(c).unwrap_or(1),
            SmsEncoding::Ucs2 => c.len_utf16(),
        }
    }
}

/// How a text will go out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsPlan {
    Single(String),
    Multipart(Vec<String>),
}

impl SmsPlan {
    pub fn for_text(text: &str) -> Self {
        let mut parts = divide_message(text);
        if parts.len() == 1 {
            SmsPlan::Single(parts.remove(0))
        } else {
            SmsPlan::Multipart(parts)
        }
    }

    pub fn part_count(&self) -> usize {
        match self {
            SmsPlan::Single(_) => 1,
            SmsPlan::Multipart(parts) => parts.len(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, SmsPlan::Multipart(_))
    }

    pub fn parts(&self) -> Vec<&str> {
        match self {
            SmsPlan::Single(text) => vec![text.as_str()],
            SmsPlan::Multipart(parts) => parts.iter().map(String::as_str).collect(),
        }
    }
}

/// Split `text` into parts that each fit one SMS.
///
/// Empty text yields one empty part. Characters are never split, so a
/// surrogate pair or an extension-table escape always stays in one part.
pub fn divide_message(text: &str) -> Vec<String> {
    let encoding = SmsEncoding::detect(text);
    let (single, multi) = encoding.limits();

    let total: usize = text.chars().map(|c| encoding.cost(c)).sum();
    if total <= single {
        return vec![text.to_string()];
    }

    let mut parts = Vec::with_capacity(total / multi + 1);
    let mut current = String::new();
    let mut used = 0;
    for c in text.chars() {
        let cost = encoding.cost(c);
        if used + cost > multi {
            parts.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += cost;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn gsm7_cost(c: char) -> Option<usize> {
    if GSM7_BASIC.contains(c) {
        Some(1)
    } else if GSM7_EXTENSION.contains(c) {
        Some(2)
    } else {
        None
    }
}
