use crate::{Location, Meta};
use std::fmt::{Display, Formatter};

impl Location {
    /// Create a location spanning a line/column range inside a source file.
    pub fn range(path: &str, from: (u32, u32), to: (u32, u32)) -> Self {
        Self {
            path: path.to_string(),
            from_line: from.0,
            from_col: from.1,
            to_line: to.0,
            to_col: to.1,
        }
    }

    /// Create a location for a single line/column point.
    pub fn point(path: &str, line: u32, col: u32) -> Self {
        Self::range(path, (line, col), (line, col))
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path, self.from_line)?;
        if self.from_col != 0 {
            write!(f, ":{}", self.from_col)?;
        }
        if self.to_line != self.from_line || self.to_col != self.from_col {
            write!(f, "-{}", self.to_line)?;
            if self.to_col != 0 {
                write!(f, ":{}", self.to_col)?;
            }
        }
        Ok(())
    }
}

impl Meta {
    pub fn none() -> Self {
        Self {
            location: None,
            doc: None,
        }
    }

    pub fn at(location: Location) -> Self {
        Self {
            location: Some(location),
            doc: None,
        }
    }

    /// Attach a documentation string. The text is preserved verbatim and
    /// never interpreted by the compiler.
    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_rendering() {
        assert_eq!(Location::point("p.spicy", 4, 0).to_string(), "p.spicy:4");
        assert_eq!(Location::point("p.spicy", 4, 7).to_string(), "p.spicy:4:7");
        assert_eq!(
            Location::range("p.spicy", (4, 7), (6, 2)).to_string(),
            "p.spicy:4:7-6:2"
        );
    }
}
