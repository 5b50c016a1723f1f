use std::collections::BTreeMap;

/// Lowercases, trims, and folds `_` into `-` so `Foo_Bar` and `foo-bar`
/// name the same product.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}

/// Built-in mappings from distribution package names to the product names
/// used in CPE identifiers. A trailing `*` matches any suffix.
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("libssl*", "openssl"),
    ("libcrypto*", "openssl"),
    ("openssl-libs", "openssl"),
    ("openssl@*", "openssl"),
    ("libcurl*", "curl"),
    ("curl-minimal", "curl"),
    ("libxml2*", "libxml2"),
    ("zlib1g*", "zlib"),
    ("libsqlite3*", "sqlite"),
    ("sqlite3", "sqlite"),
    ("libgnutls*", "gnutls"),
    ("libexpat1*", "libexpat"),
    ("expat", "libexpat"),
    ("libpcre2*", "pcre2"),
    ("libssh-*", "libssh"),
    ("libssh2-*", "libssh2"),
    ("python3.*", "python"),
    ("python@*", "python"),
];

/// Explicit product alias mapping.
///
/// Exact aliases apply to package names and to the product names of
/// affected ranges alike. Prefix aliases only fold installed package names:
/// a CPE product that merely starts with `libssl` is not OpenSSL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    exact: BTreeMap<String, String>,
    /// `(prefix, canonical)`, longest prefix first.
    prefixes: Vec<(String, String)>,
}

impl AliasTable {
    /// An empty table: names only match themselves.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in table.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (alias, canonical) in DEFAULT_ALIASES {
            table.insert(alias, canonical);
        }
        table
    }

    /// Adds a mapping. An alias ending in `*` maps every name with that
    /// prefix. Later insertions override earlier ones.
    pub fn insert(&mut self, alias: &str, canonical: &str) {
        let canonical = normalize_name(canonical);
        match alias.trim().strip_suffix('*') {
            Some(prefix) => {
                let prefix = normalize_name(prefix);
                self.prefixes.retain(|(p, _)| *p != prefix);
                self.prefixes.push((prefix, canonical));
                self.prefixes
                    .sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
            }
            None => {
                self.exact.insert(normalize_name(alias), canonical);
            }
        }
    }

    /// Returns the canonical product key for `name`.
    pub fn canonical(&self, name: &str) -> String {
        let name = normalize_name(name);
        if let Some(canonical) = self.exact.get(&name) {
            return canonical.clone();
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|(_, canonical)| canonical.clone())
            .unwrap_or(name)
    }

    /// Canonical key for the product name of an affected range. Only exact
    /// aliases apply.
    pub fn product_key(&self, product: &str) -> String {
        let product = normalize_name(product);
        self.exact.get(&product).cloned().unwrap_or(product)
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
