use core::fmt;
use std::ops::Add;

use url::Url;

const SEP: char = '/';

/// Service URL built up segment by segment.
#[derive(Clone, Debug)]
pub struct Resource {
    url: Url,
}

impl Resource {
    #[must_use]
    pub fn new(uri: &str) -> Option<Resource> {
        let base = Url::parse(uri).ok()?;
        if base.cannot_be_a_base() {
            return None;
        }
        Some(Resource { url: base })
    }

    pub fn append_path(&mut self, path: &str) -> &mut Self {
        if let Some(segments) = self.url.path_segments() {
            let p = segments
                .chain(path.split(SEP))
                .filter(|x| !x.is_empty())
                .fold(String::new(), |s, x| {
                    let mut y = s.add(x);
                    y.push(SEP);
                    y
                });

            let path_to_set = if path.chars().next_back().unwrap_or_default() == SEP || p.is_empty()
            {
                &p
            } else {
                &p[..p.len() - 1]
            };
            self.url.set_path(path_to_set);
        } else if let Ok(u) = self.url.join(path) {
            self.url = u;
        }
        self
    }

    /// Appends a single path segment, percent-encoding separators inside it.
    pub fn append_segment(&mut self, segment: &str) -> &mut Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        self
    }

    pub fn append_query(&mut self, key: &str, value: &str) -> &mut Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    #[must_use]
    pub fn join_path(&self, path: &str) -> Resource {
        let mut r = self.clone();
        r.append_path(path);
        r
    }

    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn new_correct_some() {
        // Arrange

        // Act
        let r = Resource::new("http://localhost");

        // Assert
        assert!(r.is_some());
    }

    #[rstest]
    #[case("http/localhost")]
    #[case("mailto:someone@example.com")]
    #[trace]
    fn new_incorrect_none(#[case] uri: &str) {
        // Act
        let r = Resource::new(uri);

        // Assert
        assert!(r.is_none());
    }

    #[rstest]
    #[case("http://localhost", "x", "http://localhost/x")]
    #[case("http://localhost", "/x/", "http://localhost/x/")]
    #[case("http://localhost/", "x/y", "http://localhost/x/y")]
    #[case("http://localhost/x", "/y", "http://localhost/x/y")]
    #[case("http://localhost/x/", "y/", "http://localhost/x/y/")]
    #[case("https://rflogs.io", "/api/runs", "https://rflogs.io/api/runs")]
    #[case(
        "https://rflogs.io",
        "/files/1234abcd/log.html",
        "https://rflogs.io/files/1234abcd/log.html"
    )]
    #[case("https://example.com/rflogs/", "api/runs", "https://example.com/rflogs/api/runs")]
    #[trace]
    fn append_path_tests(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        // Arrange
        let mut r = Resource::new(base).unwrap();

        // Act
        r.append_path(path);

        // Assert
        assert_eq!(r.to_string().as_str(), expected);
    }

    #[test]
    fn append_path_twice() {
        // Arrange
        let mut r = Resource::new("http://localhost").unwrap();

        // Act
        r.append_path("api").append_path("runs");

        // Assert
        assert_eq!(r.to_string().as_str(), "http://localhost/api/runs");
    }

    #[test]
    fn append_segment_escapes_separators() {
        // Arrange
        let mut r = Resource::new("http://localhost/api/runs").unwrap();

        // Act
        r.append_segment("a/b c");

        // Assert
        assert_eq!(r.to_string().as_str(), "http://localhost/api/runs/a%2Fb%20c");
    }

    #[test]
    fn append_query_encodes_value() {
        // Arrange
        let mut r = Resource::new("https://rflogs.io").unwrap();

        // Act
        r.append_path("run-details.html").append_query("runId", "12 34");

        // Assert
        assert_eq!(
            r.to_string().as_str(),
            "https://rflogs.io/run-details.html?runId=12+34"
        );
    }

    #[test]
    fn join_path_leaves_base_untouched() {
        // Arrange
        let base = Resource::new("https://rflogs.io").unwrap();

        // Act
        let joined = base.join_path("api/runs");

        // Assert
        assert_eq!(base.to_string(), "https://rflogs.io/");
        assert_eq!(joined.to_string(), "https://rflogs.io/api/runs");
    }
}
