use serde::{Deserialize, Serialize};
use std::fmt;

/// One song, identified only by its "Title - Artist" string.
///
/// Equality is an exact, case-sensitive comparison of that string. The value is
/// passed to download tools as an opaque query and is never validated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Track(String);

impl Track {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the canonical "Title - Artist" form.
    pub fn from_parts(title: &str, artist: &str) -> Self {
        Self(format!("{} - {}", title.trim(), artist.trim()))
    }

    /// Splits on the last `" - "`, since titles often contain dashes but
    /// artists rarely do. Returns `None` when there is no separator.
    pub fn title_artist(&self) -> Option<(&str, &str)> {
        self.0
            .rsplit_once(" - ")
            .map(|(title, artist)| (title.trim(), artist.trim()))
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Track {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Track {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Track {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
