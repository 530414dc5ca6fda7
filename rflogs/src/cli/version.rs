use std::env;
use std::io::{self, Write};

use super::config::Settings;

pub struct VersionInfo<'a> {
    pub name: &'static str,
    pub version: &'static str,
    pub os: &'static str,
    pub architecture: &'static str,
    pub service: &'a str,
}

impl<'a> VersionInfo<'a> {
    #[must_use]
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            name: clap::crate_name!(),
            version: clap::crate_version!(),
            os: env::consts::OS,
            architecture: env::consts::ARCH,
            service: &settings.base_url,
        }
    }

    pub fn print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Name           : {}", self.name)?;
        writeln!(out, "Version        : {}", self.version)?;
        writeln!(out, "OS             : {}", self.os)?;
        writeln!(out, "Architecture   : {}", self.architecture)?;
        writeln!(out, "Service        : {}", self.service)
    }
}

pub fn run(settings: &Settings) -> io::Result<()> {
    VersionInfo::new(settings).print(&mut io::stdout().lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_aligned_fields() {
        // Arrange
        let settings = Settings {
            base_url: "https://example.com".to_owned(),
            ..Settings::default()
        };
        let mut out = Vec::new();

        // Act
        VersionInfo::new(&settings).print(&mut out).unwrap();

        // Assert
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Name           : rflogs");
        assert_eq!(lines[4], "Service        : https://example.com");
    }
}
