// src/db/desc.rs

//! The `desc` stanza format used by package database entries
//!
//! An entry is a sequence of `%KEY%` headers, each followed by one value per
//! line and terminated by a blank line:
//!
//! ```text
//! %NAME%
//! pacman
//!
//! %DEPENDS%
//! glibc
//! curl>=7.0
//! ```
//!
//! Sync databases store one such stanza per package inside a tarball; the
//! local database keeps one `name-version/desc` file per installed package.

use crate::error::{Error, Result};
use crate::package::{InstallReason, Package};
use std::fmt::Write as _;

/// Parse one desc stanza into a package record.
///
/// `%NAME%` and `%VERSION%` are mandatory; unknown keys are ignored so
/// newer database fields do not break older readers.
pub(crate) fn parse(text: &str) -> Result<Package> {
    let mut name = None;
    let mut version = None;
    let mut pkg = Package::new("", "");

    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let line = line.trim_end();
        if !(line.starts_with('%') && line.ends_with('%') && line.len() > 2) {
            continue;
        }
        let key = &line[1..line.len() - 1];

        let mut values = Vec::new();
        while let Some(&value) = lines.peek() {
            let value = value.trim_end();
            if value.is_empty() || (value.starts_with('%') && value.ends_with('%')) {
                break;
            }
            values.push(value.to_string());
            lines.next();
        }

        let first = values.first().map(String::as_str);
        match key {
            "NAME" => name = first.map(str::to_string),
            "VERSION" => version = first.map(str::to_string),
            "DESC" => pkg.desc = first.map(str::to_string),
            "URL" => pkg.url = first.map(str::to_string),
            "ARCH" => pkg.arch = first.map(str::to_string),
            "PACKAGER" => pkg.packager = first.map(str::to_string),
            "FILENAME" => pkg.filename = first.map(str::to_string),
            "SHA256SUM" => pkg.sha256sum = first.map(str::to_string),
            "CSIZE" => pkg.size = parse_int(key, first)?,
            "ISIZE" | "SIZE" => pkg.isize = parse_int(key, first)?,
            "BUILDDATE" => pkg.builddate = parse_int(key, first)?,
            "INSTALLDATE" => pkg.installdate = parse_int(key, first)?,
            "REASON" => {
                pkg.reason = match first {
                    Some("1") => InstallReason::Dependency,
                    _ => InstallReason::Explicit,
                }
            }
            "LICENSE" => pkg.licenses = values,
            "GROUPS" => pkg.groups = values,
            "DEPENDS" => pkg.depends = parse_deps(values)?,
            "OPTDEPENDS" => pkg.optdepends = values,
            "PROVIDES" => pkg.provides = parse_deps(values)?,
            "CONFLICTS" => pkg.conflicts = parse_deps(values)?,
            "REPLACES" => pkg.replaces = parse_deps(values)?,
            _ => {}
        }
    }

    pkg.name = name.ok_or_else(|| Error::Parse("desc entry has no %NAME%".to_string()))?;
    pkg.version = version.ok_or_else(|| Error::Parse("desc entry has no %VERSION%".to_string()))?;
    Ok(pkg)
}

/// Render a package record as a desc stanza, the inverse of [`parse`].
pub(crate) fn render(pkg: &Package) -> String {
    let mut out = String::new();

    section(&mut out, "NAME", &[pkg.name.clone()]);
    section(&mut out, "VERSION", &[pkg.version.clone()]);
    opt_section(&mut out, "DESC", pkg.desc.as_deref());
    opt_section(&mut out, "URL", pkg.url.as_deref());
    opt_section(&mut out, "ARCH", pkg.arch.as_deref());
    opt_section(&mut out, "PACKAGER", pkg.packager.as_deref());
    opt_section(&mut out, "FILENAME", pkg.filename.as_deref());
    opt_section(&mut out, "SHA256SUM", pkg.sha256sum.as_deref());
    if pkg.size > 0 {
        section(&mut out, "CSIZE", &[pkg.size.to_string()]);
    }
    if pkg.isize > 0 {
        section(&mut out, "ISIZE", &[pkg.isize.to_string()]);
    }
    if pkg.builddate > 0 {
        section(&mut out, "BUILDDATE", &[pkg.builddate.to_string()]);
    }
    if pkg.installdate > 0 {
        section(&mut out, "INSTALLDATE", &[pkg.installdate.to_string()]);
    }
    if pkg.reason == InstallReason::Dependency {
        section(&mut out, "REASON", &["1".to_string()]);
    }
    section(&mut out, "LICENSE", &pkg.licenses);
    section(&mut out, "GROUPS", &pkg.groups);
    section_deps(&mut out, "DEPENDS", &pkg.depends);
    section(&mut out, "OPTDEPENDS", &pkg.optdepends);
    section_deps(&mut out, "PROVIDES", &pkg.provides);
    section_deps(&mut out, "CONFLICTS", &pkg.conflicts);
    section_deps(&mut out, "REPLACES", &pkg.replaces);

    out
}

fn parse_int<T: std::str::FromStr>(key: &str, value: Option<&str>) -> Result<T> {
    let value = value.unwrap_or("0");
    value
        .parse()
        .map_err(|_| Error::Parse(format!("bad %{key}% value '{value}'")))
}

fn parse_deps(values: Vec<String>) -> Result<Vec<crate::dep::Depend>> {
    values.iter().map(|v| v.parse()).collect()
}

fn section(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    let _ = writeln!(out, "%{key}%");
    for value in values {
        let _ = writeln!(out, "{value}");
    }
    out.push('\n');
}

fn opt_section(out: &mut String, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        section(out, key, &[value.to_string()]);
    }
}

fn section_deps(out: &mut String, key: &str, deps: &[crate::dep::Depend]) {
    let values: Vec<String> = deps.iter().map(ToString::to_string).collect();
    section(out, key, &values);
}
