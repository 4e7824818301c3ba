// src/packages/desc.rs

//! `%FIELD%` descriptor records
//!
//! Repository archives and the local install tree store package metadata as
//! blocks of the form:
//!
//! ```text
//! %NAME%
//! zlib
//!
//! %DEPENDS%
//! glibc
//! ```
//!
//! Every known field maps to a slot of [`PackageDescriptor`] through the
//! static [`FIELDS`] table. Unknown fields are an error.

use super::dependency::Dependency;
use super::descriptor::PackageDescriptor;
use crate::error::{Error, Result};
use std::fmt::Write;

/// Descriptor slot a field decodes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Base,
    Version,
    Desc,
    Url,
    UrlPath,
    Filename,
    Maintainer,
    Packager,
    BuildDate,
    InstallDate,
    Size,
    CSize,
    ISize,
    Md5Sum,
    Sha256Sum,
    PgpSig,
    Validation,
    Reason,
    Arch,
    License,
    Groups,
    XData,
    Depends,
    MakeDepends,
    CheckDepends,
    OptDepends,
    Conflicts,
    Provides,
    Replaces,
    NumVotes,
    Popularity,
    OutOfDate,
}

/// Record field names in the order the encoder writes them
pub static FIELDS: &[(&str, Field)] = &[
    ("FILENAME", Field::Filename),
    ("NAME", Field::Name),
    ("BASE", Field::Base),
    ("VERSION", Field::Version),
    ("DESC", Field::Desc),
    ("URL", Field::Url),
    ("URLPATH", Field::UrlPath),
    ("ARCH", Field::Arch),
    ("BUILDDATE", Field::BuildDate),
    ("INSTALLDATE", Field::InstallDate),
    ("MAINTAINER", Field::Maintainer),
    ("PACKAGER", Field::Packager),
    ("REASON", Field::Reason),
    ("SIZE", Field::Size),
    ("CSIZE", Field::CSize),
    ("ISIZE", Field::ISize),
    ("MD5SUM", Field::Md5Sum),
    ("SHA256SUM", Field::Sha256Sum),
    ("PGPSIG", Field::PgpSig),
    ("VALIDATION", Field::Validation),
    ("LICENSE", Field::License),
    ("GROUPS", Field::Groups),
    ("XDATA", Field::XData),
    ("REPLACES", Field::Replaces),
    ("CONFLICTS", Field::Conflicts),
    ("PROVIDES", Field::Provides),
    ("DEPENDS", Field::Depends),
    ("OPTDEPENDS", Field::OptDepends),
    ("MAKEDEPENDS", Field::MakeDepends),
    ("CHECKDEPENDS", Field::CheckDepends),
    ("NUMVOTES", Field::NumVotes),
    ("POPULARITY", Field::Popularity),
    ("OUTOFDATE", Field::OutOfDate),
];

/// Mutable view of one descriptor slot
pub enum Slot<'a> {
    Str(&'a mut String),
    List(&'a mut Vec<String>),
    Deps(&'a mut Vec<Dependency>),
    Num(&'a mut u64),
    Float(&'a mut f64),
}

/// Read-only view of one descriptor slot
pub enum View<'a> {
    Str(&'a str),
    List(&'a [String]),
    Deps(&'a [Dependency]),
    Num(u64),
    Float(f64),
}

impl Field {
    /// Look a record field name up in [`FIELDS`]
    pub fn lookup(name: &str) -> Option<Field> {
        FIELDS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    pub fn name(self) -> &'static str {
        FIELDS
            .iter()
            .find(|(_, f)| *f == self)
            .map_or("?", |(n, _)| n)
    }

    pub fn slot(self, d: &mut PackageDescriptor) -> Slot<'_> {
        match self {
            Field::Name => Slot::Str(&mut d.name),
            Field::Base => Slot::Str(&mut d.base),
            Field::Version => Slot::Str(&mut d.version),
            Field::Desc => Slot::Str(&mut d.description),
            Field::Url => Slot::Str(&mut d.url),
            Field::UrlPath => Slot::Str(&mut d.url_path),
            Field::Filename => Slot::Str(&mut d.filename),
            Field::Maintainer => Slot::Str(&mut d.maintainer),
            Field::Packager => Slot::Str(&mut d.packager),
            Field::Md5Sum => Slot::Str(&mut d.md5sum),
            Field::Sha256Sum => Slot::Str(&mut d.sha256sum),
            Field::PgpSig => Slot::Str(&mut d.pgpsig),
            Field::Validation => Slot::Str(&mut d.validation),
            Field::Arch => Slot::Str(&mut d.arch),
            Field::BuildDate => Slot::Num(&mut d.build_date),
            Field::InstallDate => Slot::Num(&mut d.install_date),
            Field::Size => Slot::Num(&mut d.size),
            Field::CSize => Slot::Num(&mut d.csize),
            Field::ISize => Slot::Num(&mut d.isize),
            Field::Reason => Slot::Num(&mut d.reason),
            Field::NumVotes => Slot::Num(&mut d.num_votes),
            Field::OutOfDate => Slot::Num(&mut d.out_of_date),
            Field::Popularity => Slot::Float(&mut d.popularity),
            Field::License => Slot::List(&mut d.license),
            Field::Groups => Slot::List(&mut d.groups),
            Field::XData => Slot::List(&mut d.xdata),
            Field::Depends => Slot::Deps(&mut d.depends),
            Field::MakeDepends => Slot::Deps(&mut d.make_depends),
            Field::CheckDepends => Slot::Deps(&mut d.check_depends),
            Field::OptDepends => Slot::Deps(&mut d.opt_depends),
            Field::Conflicts => Slot::Deps(&mut d.conflicts),
            Field::Provides => Slot::Deps(&mut d.provides),
            Field::Replaces => Slot::Deps(&mut d.replaces),
        }
    }

    pub fn view(self, d: &PackageDescriptor) -> View<'_> {
        match self {
            Field::Name => View::Str(&d.name),
            Field::Base => View::Str(&d.base),
            Field::Version => View::Str(&d.version),
            Field::Desc => View::Str(&d.description),
            Field::Url => View::Str(&d.url),
            Field::UrlPath => View::Str(&d.url_path),
            Field::Filename => View::Str(&d.filename),
            Field::Maintainer => View::Str(&d.maintainer),
            Field::Packager => View::Str(&d.packager),
            Field::Md5Sum => View::Str(&d.md5sum),
            Field::Sha256Sum => View::Str(&d.sha256sum),
            Field::PgpSig => View::Str(&d.pgpsig),
            Field::Validation => View::Str(&d.validation),
            Field::Arch => View::Str(&d.arch),
            Field::BuildDate => View::Num(d.build_date),
            Field::InstallDate => View::Num(d.install_date),
            Field::Size => View::Num(d.size),
            Field::CSize => View::Num(d.csize),
            Field::ISize => View::Num(d.isize),
            Field::Reason => View::Num(d.reason),
            Field::NumVotes => View::Num(d.num_votes),
            Field::OutOfDate => View::Num(d.out_of_date),
            Field::Popularity => View::Float(d.popularity),
            Field::License => View::List(&d.license),
            Field::Groups => View::List(&d.groups),
            Field::XData => View::List(&d.xdata),
            Field::Depends => View::Deps(&d.depends),
            Field::MakeDepends => View::Deps(&d.make_depends),
            Field::CheckDepends => View::Deps(&d.check_depends),
            Field::OptDepends => View::Deps(&d.opt_depends),
            Field::Conflicts => View::Deps(&d.conflicts),
            Field::Provides => View::Deps(&d.provides),
            Field::Replaces => View::Deps(&d.replaces),
        }
    }

    /// Dependency entry parser for this field
    pub fn parse_dependency(self, raw: &str) -> Dependency {
        if self == Field::OptDepends {
            Dependency::parse_optional(raw)
        } else {
            Dependency::parse(raw)
        }
    }
}

fn is_terminator(line: Option<&&str>) -> bool {
    match line {
        None => true,
        Some(l) => l.is_empty() || l.starts_with('%'),
    }
}

/// Decode one `%FIELD%` record into a fresh descriptor
pub fn parse(data: &[u8]) -> Result<PackageDescriptor> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::ParseError(format!("Descriptor is not valid UTF-8: {}", e)))?;

    let mut desc = PackageDescriptor::default();
    let mut lines = text.split('\n').peekable();

    while let Some(line) = lines.next() {
        if line.is_empty() {
            continue;
        }

        let name = line
            .strip_prefix('%')
            .and_then(|l| l.strip_suffix('%'))
            .ok_or_else(|| Error::ParseError(format!("Expected %FIELD%, found '{}'", line)))?;
        let field = Field::lookup(name).ok_or_else(|| Error::UnknownField(name.to_string()))?;

        if is_terminator(lines.peek()) {
            return Err(Error::ParseError(format!("Field %{}% has no value", name)));
        }

        match field.slot(&mut desc) {
            Slot::Str(s) => {
                *s = lines.next().unwrap_or_default().to_string();
                if !is_terminator(lines.peek()) {
                    return Err(Error::ParseError(format!(
                        "Field %{}% expects a single value",
                        name
                    )));
                }
            }
            Slot::Num(n) => {
                let value = lines.next().unwrap_or_default();
                *n = value.parse().map_err(|_| {
                    Error::ParseError(format!("Field %{}%: '{}' is not an integer", name, value))
                })?;
                if !is_terminator(lines.peek()) {
                    return Err(Error::ParseError(format!(
                        "Field %{}% expects a single value",
                        name
                    )));
                }
            }
            Slot::Float(x) => {
                let value = lines.next().unwrap_or_default();
                *x = value.parse().map_err(|_| {
                    Error::ParseError(format!("Field %{}%: '{}' is not a number", name, value))
                })?;
                if !is_terminator(lines.peek()) {
                    return Err(Error::ParseError(format!(
                        "Field %{}% expects a single value",
                        name
                    )));
                }
            }
            Slot::List(list) => {
                while !is_terminator(lines.peek()) {
                    if let Some(value) = lines.next() {
                        list.push(value.to_string());
                    }
                }
            }
            Slot::Deps(deps) => {
                while !is_terminator(lines.peek()) {
                    if let Some(value) = lines.next() {
                        deps.push(field.parse_dependency(value));
                    }
                }
            }
        }
    }

    if desc.name.is_empty() {
        return Err(Error::MissingName);
    }
    Ok(desc)
}

/// Encode a descriptor back into the `%FIELD%` format.
///
/// Empty strings, empty lists and zero numbers are omitted.
pub fn encode(desc: &PackageDescriptor) -> String {
    let mut out = String::new();

    for (name, field) in FIELDS {
        let values: Vec<String> = match field.view(desc) {
            View::Str(s) if !s.is_empty() => vec![s.to_string()],
            View::List(l) => l.to_vec(),
            View::Deps(d) => d.iter().map(|dep| dep.to_string()).collect(),
            View::Num(n) if n != 0 => vec![n.to_string()],
            View::Float(x) if x != 0.0 => vec![x.to_string()],
            _ => Vec::new(),
        };
        if values.is_empty() {
            continue;
        }

        let _ = writeln!(out, "%{}%", name);
        for value in values {
            let _ = writeln!(out, "{}", value);
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZLIB: &str = "%FILENAME%
zlib-1:1.3.1-2-x86_64.pkg.tar.zst

%NAME%
zlib

%BASE%
zlib

%VERSION%
1:1.3.1-2

%DESC%
Compression library implementing the deflate compression method found in gzip and PKZIP

%CSIZE%
92164

%ISIZE%
162379

%SHA256SUM%
0a1c1ef0b9d4d3b3b6f8b2b8f1c1a8b3d5e0c2f1a1b2c3d4e5f60718293a4b5c

%URL%
https://www.zlib.net/

%LICENSE%
Zlib

%ARCH%
x86_64

%BUILDDATE%
1710166400

%PACKAGER%
Levente Polyak <anthraxx@archlinux.org>

%PROVIDES%
libz.so=1-64

%DEPENDS%
glibc

%MAKEDEPENDS%
git

";

    #[test]
    fn test_parse_repository_record() {
        let desc = parse(ZLIB.as_bytes()).unwrap();
        assert_eq!(desc.name, "zlib");
        assert_eq!(desc.version, "1:1.3.1-2");
        assert_eq!(desc.filename, "zlib-1:1.3.1-2-x86_64.pkg.tar.zst");
        assert_eq!(desc.csize, 92164);
        assert_eq!(desc.build_date, 1710166400);
        assert_eq!(desc.license, vec!["Zlib"]);
        assert_eq!(desc.depends, vec![Dependency::parse("glibc")]);
        assert_eq!(desc.provides[0].name, "libz.so");
        assert_eq!(desc.provides[0].version(), "1-64");
        assert!(desc.link.is_none());
        assert!(desc.var.is_none());
    }

    #[test]
    fn test_parse_field_followed_by_field() {
        let desc = parse(b"%NAME%\nfoo\n%VERSION%\n1.0\n%DEPENDS%\na\nb\n%REASON%\n1").unwrap();
        assert_eq!(desc.name, "foo");
        assert_eq!(desc.version, "1.0");
        assert_eq!(desc.depends.len(), 2);
        assert_eq!(desc.reason, 1);
    }

    #[test]
    fn test_optdepends_keep_description() {
        let desc = parse(b"%NAME%\nvim\n\n%OPTDEPENDS%\npython: Python 3 language support\nruby\n")
            .unwrap();
        assert_eq!(desc.opt_depends[0].name, "python");
        assert_eq!(
            desc.opt_depends[0].description.as_deref(),
            Some("Python 3 language support")
        );
        assert_eq!(desc.opt_depends[1].description, None);
    }

    #[test]
    fn test_unknown_field() {
        let err = parse(b"%NAME%\nfoo\n\n%FROBNICATE%\nyes\n").unwrap_err();
        assert!(matches!(err, Error::UnknownField(f) if f == "FROBNICATE"));
    }

    #[test]
    fn test_string_field_with_two_values() {
        let err = parse(b"%NAME%\nfoo\nbar\n").unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_partial_number_rejected() {
        assert!(matches!(
            parse(b"%NAME%\nfoo\n\n%SIZE%\n12kb\n"),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(
            parse(b"%NAME%\nfoo\n\n%POPULARITY%\n0.5x\n"),
            Err(Error::ParseError(_))
        ));
        let desc = parse(b"%NAME%\nfoo\n\n%POPULARITY%\n0.25\n").unwrap();
        assert_eq!(desc.popularity, 0.25);
    }

    #[test]
    fn test_missing_name() {
        assert!(matches!(parse(b"%VERSION%\n1.0\n"), Err(Error::MissingName)));
        assert!(matches!(parse(b""), Err(Error::MissingName)));
    }

    #[test]
    fn test_field_without_value() {
        assert!(matches!(parse(b"%NAME%\n\n"), Err(Error::ParseError(_))));
        assert!(matches!(parse(b"%NAME%"), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_garbage_line() {
        assert!(matches!(parse(b"NAME\nfoo\n"), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_round_trip() {
        let original = parse(ZLIB.as_bytes()).unwrap();
        let encoded = encode(&original);
        let decoded = parse(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, original);

        let desc = PackageDescriptor {
            name: "yay".to_string(),
            version: "12.3.5-1".to_string(),
            reason: 1,
            popularity: 1.234567,
            num_votes: 2345,
            groups: vec!["base-devel".to_string()],
            opt_depends: vec![Dependency::parse_optional("git: for -G")],
            conflicts: vec![Dependency::parse("yay-bin<=12")],
            replaces: vec![Dependency::parse("yaourt")],
            ..Default::default()
        };
        assert_eq!(parse(encode(&desc).as_bytes()).unwrap(), desc);
    }

    #[test]
    fn test_table_is_consistent() {
        for (name, field) in FIELDS {
            assert_eq!(Field::lookup(name), Some(*field));
            assert_eq!(field.name(), *name);
        }
        assert_eq!(FIELDS.len(), 33);
    }
}
