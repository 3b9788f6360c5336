// Copyright 2017-2021 Lukas Pustina <lukas@pustina.de>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt::{self, Display, Write};

use chrono::{DateTime, TimeZone};

use crate::resolver::Resolutions;

pub static START_MARKER: &str = "# DOMAINTOIP Host Start";
pub static END_MARKER: &str = "# DOMAINTOIP Host End";
static TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";
const IP_COLUMN_WIDTH: usize = 20;

/// Rendered hosts file snippet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsDocument {
    inner: String,
}

impl HostsDocument {
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Address and domain name pairs of all mapping lines.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                Some((fields.next()?, fields.next()?))
            })
    }
}

impl Display for HostsDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl From<HostsDocument> for String {
    fn from(doc: HostsDocument) -> Self {
        doc.inner
    }
}

/// Renders one `<ip> <domain>` line per resolution in domain name order, framed by start and end markers.
pub fn render<Tz: TimeZone>(resolutions: &Resolutions, timestamp: &DateTime<Tz>) -> HostsDocument
where
    Tz::Offset: Display,
{
    let mut entries = String::new();
    for (domain, ip) in resolutions {
        // Writing to a String cannot fail
        let _ = writeln!(entries, "{:<width$}{}", ip, domain, width = IP_COLUMN_WIDTH);
    }

    let inner = format!(
        "\n{}\n{}\n\n# Update time: {}\n{}\n",
        START_MARKER,
        entries,
        timestamp.format(TIMESTAMP_FORMAT),
        END_MARKER
    );

    HostsDocument { inner }
}
