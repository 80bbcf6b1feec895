use crate::errors::ImageError;
use regex::Regex;
use std::{fmt, str::FromStr};

/// Prefix Docker Hub uses for official images, which are referenced by a
/// single path segment like `ubuntu`.
const OFFICIAL_PREFIX: &str = "library";

/// Name of a Docker-style image repository
///
/// Repository names are path-like groupings of lowercase alphanumeric
/// segments separated by slashes. Each grouping may also contain internal
/// separator characters: single periods, single underscores, double
/// underscores, or any number of dashes.
#[derive(Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Repository {
    serialized: String,
}

impl Repository {
    pub fn as_str(&self) -> &str {
        &self.serialized
    }

    /// Parse a [prim@str] as a [Repository]
    ///
    /// ```
    /// # use minidock::image::Repository;
    /// let repo = Repository::parse("some/path").unwrap();
    /// assert_eq!(repo.segments().collect::<Vec<_>>(), vec!["some", "path"]);
    /// assert!(Repository::parse("Some/Path").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, ImageError> {
        lazy_static! {
            static ref RE: Regex = Regex::new(&format!("^{}$", Repository::regex_str())).unwrap();
        }
        if RE.is_match(s) {
            Ok(Repository {
                serialized: s.to_owned(),
            })
        } else {
            Err(ImageError::InvalidReferenceFormat(s.to_owned()))
        }
    }

    /// Iterate over the slash-separated parts of the repository path
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.serialized.split('/')
    }

    /// Path of this repository on the registry server
    ///
    /// Single-segment names are official images and live under `library/`.
    ///
    /// ```
    /// # use minidock::image::Repository;
    /// assert_eq!(Repository::parse("redis").unwrap().registry_path(), "library/redis");
    /// assert_eq!(Repository::parse("bitnami/redis").unwrap().registry_path(), "bitnami/redis");
    /// ```
    pub fn registry_path(&self) -> String {
        if self.serialized.contains('/') {
            self.serialized.clone()
        } else {
            format!("{}/{}", OFFICIAL_PREFIX, self.serialized)
        }
    }

    pub(crate) fn regex_str() -> &'static str {
        concat!(
            "(?P<repo>", // Repository match group
            /*  */ "(?:", // Main name component
            /* -- */ "[a-z0-9]+",
            /* -- */ "(?:",
            /* -- -- */ "(?:[._]|__|[-]*)", // allowed separators
            /* -- -- */ "[a-z0-9]+",
            /* -- */ ")*",
            /*  */ ")",
            /*  */ "(?:", // Optional additional name components
            /* -- */ "/",
            /* -- */ "[a-z0-9]+",
            /* -- */ "(?:",
            /* -- -- */ "(?:[._]|__|[-]*)",
            /* -- -- */ "[a-z0-9]+",
            /* -- */ ")*",
            /*  */ ")*",
            ")"
        )
    }
}

impl FromStr for Repository {
    type Err = ImageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Repository::parse(s)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Repository({})", self.serialized)
    }
}
