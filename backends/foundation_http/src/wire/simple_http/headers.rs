use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// A header name compared without regard to ASCII case.
///
/// The original spelling is kept for display; ordering and equality use the
/// lowercased form.
#[derive(Debug, Clone)]
pub struct FieldKey(String);

impl FieldKey {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> impl Iterator<Item = u8> + '_ {
        self.0.bytes().map(|b| b.to_ascii_lowercase())
    }
}

impl PartialEq for FieldKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for FieldKey {}

impl PartialOrd for FieldKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(other.folded())
    }
}

impl core::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only, case-insensitive view of a header table: each name maps to
/// its values in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(BTreeMap<FieldKey, Vec<String>>);

impl FieldMap {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Vec<String>> {
        self.0.get(&FieldKey::new(name))
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(&FieldKey::new(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &Vec<String>)> {
        self.0.iter()
    }
}

/// Ordered multimap of header fields.
///
/// Duplicate names are allowed and keep their insertion order. An optional
/// status line lives in the first slot under an empty name; it travels with
/// the fields through reading and serialization but is hidden from
/// [`HttpHeaders::get`] and [`HttpHeaders::field_map`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    fields: Vec<(String, String)>,
    has_status_line: bool,
}

impl HttpHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn first_field(&self) -> usize {
        usize::from(self.has_status_line)
    }

    /// Appends a field without touching existing fields of the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Appends a field only when no field of that name exists yet.
    pub fn add_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self.get(&name).is_none() {
            self.add(name, value);
        }
    }

    /// Replaces every field named `name` with a single new field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove_all(&name);
        self.add(name, value);
    }

    /// Drops every field whose name matches case-insensitively.
    pub fn remove_all(&mut self, name: &str) {
        let start = self.first_field();
        let mut index = 0;
        self.fields.retain(|(key, _)| {
            let keep = index < start || !key.eq_ignore_ascii_case(name);
            index += 1;
            keep
        });
    }

    /// Value of the last field matching `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Iterates the fields, status line excluded, in insertion order.
    pub fn fields(&self) -> impl DoubleEndedIterator<Item = (&str, &str)> {
        self.fields[self.first_field()..]
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Value at a raw position; position 0 is the status line when one is set.
    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|(_, value)| value.as_str())
    }

    /// Name at a raw position; the status line slot has an empty name.
    #[must_use]
    pub fn key_at(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|(key, _)| key.as_str())
    }

    /// Number of raw slots, status line included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn set_status_line(&mut self, line: impl Into<String>) {
        if self.has_status_line {
            self.fields[0].1 = line.into();
        } else {
            self.fields.insert(0, (String::new(), line.into()));
            self.has_status_line = true;
        }
    }

    #[must_use]
    pub fn status_line(&self) -> Option<&str> {
        if self.has_status_line {
            self.value_at(0)
        } else {
            None
        }
    }

    /// Case-insensitive snapshot of the fields, leaving out the status line and
    /// nameless fields.
    #[must_use]
    pub fn field_map(&self) -> FieldMap {
        let mut map: BTreeMap<FieldKey, Vec<String>> = BTreeMap::new();
        for (key, value) in self.fields() {
            if key.is_empty() {
                continue;
            }
            map.entry(FieldKey::new(key))
                .or_default()
                .push(value.to_string());
        }
        FieldMap(map)
    }

    /// Writes every named field as `Name: Value\r\n` in insertion order.
    ///
    /// # Errors
    /// Returns any error raised by `writer`.
    pub fn write_fields<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for (key, value) in self.fields() {
            if key.is_empty() {
                continue;
            }
            write!(writer, "{key}: {value}\r\n")?;
        }
        Ok(())
    }
}

struct HttpHeadersVisitor;

impl<'de> Visitor<'de> for HttpHeadersVisitor {
    type Value = HttpHeaders;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a sequence of [name, value] pairs")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut headers = HttpHeaders::new();
        while let Some((name, value)) = seq.next_element::<(String, String)>()? {
            headers.add(name, value);
        }
        Ok(headers)
    }
}

impl<'de> Deserialize<'de> for HttpHeaders {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(HttpHeadersVisitor)
    }
}
