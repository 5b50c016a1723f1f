//! CPE 2.3 formatted-string parsing.
//!
//! Format: `cpe:2.3:part:vendor:product:version:update:edition:language:sw_edition:target_sw:target_hw:other`

/// The fields of a CPE name that matter for matching installed packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpeName {
    pub part: String,
    pub vendor: String,
    pub product: String,
    /// `None` for the `*` (any) and `-` (not applicable) wildcards.
    pub version: Option<String>,
    pub update: Option<String>,
}

impl CpeName {
    /// Parses a `cpe:2.3:` formatted string or a legacy `cpe:/` URI.
    pub fn parse(cpe: &str) -> Option<Self> {
        let fields = if let Some(rest) = cpe.strip_prefix("cpe:2.3:") {
            split_escaped(rest)
        } else if let Some(rest) = cpe.strip_prefix("cpe:/") {
            rest.split(':').map(decode_percent).collect()
        } else {
            return None;
        };

        if fields.len() < 3 {
            return None;
        }
        let product = fields[2].clone();
        if is_wildcard(&product) {
            return None;
        }

        let field = |i: usize| fields.get(i).filter(|v| !is_wildcard(v)).cloned();
        Some(Self {
            part: fields[0].clone(),
            vendor: fields[1].clone(),
            product,
            version: field(3),
            update: field(4),
        })
    }

    /// The version to compare against, with a non-wildcard update
    /// attribute appended the way distributions spell it (`1.0.2` + `k`).
    pub fn full_version(&self) -> Option<String> {
        let version = self.version.as_ref()?;
        match &self.update {
            Some(update) if update.chars().all(|c| c.is_ascii_alphanumeric()) && update.len() <= 2 => {
                Some(format!("{}{}", version, update))
            }
            _ => Some(version.clone()),
        }
    }
}

fn is_wildcard(value: &str) -> bool {
    value.is_empty() || value == "*" || value == "-"
}

/// Splits on `:` except where escaped with a backslash, dropping the
/// escape characters.
fn split_escaped(input: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn decode_percent(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3);
        match code.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
            Some(byte) if byte.is_ascii() => {
                out.push(byte as char);
                rest = &rest[pos + 3..];
            }
            _ => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}
