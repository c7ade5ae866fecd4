// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Layout report printed by `inspect`.

use std::io::{self, Write};

use comfy_table::Table;
use echo_parcel::{Parcel, Span, SpanKind, WireFormat};
use serde::Serialize;

/// Summary of an unmarshalled blob.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Format the blob was decoded as.
    pub format: WireFormat,
    /// Data size after unmarshalling.
    pub size: usize,
    /// Capacity after unmarshalling.
    pub capacity: usize,
    /// Ledger layout, in offset order.
    pub spans: Vec<Span>,
}

impl Report {
    /// Snapshot `parcel` as decoded from `format`.
    pub fn new(format: WireFormat, parcel: &Parcel) -> Self {
        Self {
            format,
            size: parcel.data_size(),
            capacity: parcel.data_capacity(),
            spans: parcel.layout(),
        }
    }

    /// Human-readable form: a summary line, then one table row per span.
    pub fn write_table(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(
            out,
            "format {} size {} capacity {}",
            format_label(self.format),
            self.size,
            self.capacity
        )?;
        if self.spans.is_empty() {
            return writeln!(out, "(empty)");
        }
        let mut table = Table::new();
        table.set_header(vec!["offset", "len", "kind", "value"]);
        for span in &self.spans {
            table.add_row(vec![
                span.offset.to_string(),
                span.len.to_string(),
                kind_label(span.kind),
                span.value.clone().unwrap_or_default(),
            ]);
        }
        writeln!(out, "{table}")
    }
}

const fn format_label(format: WireFormat) -> &'static str {
    match format {
        WireFormat::Detect => "detect",
        WireFormat::Native => "native",
        WireFormat::Legacy => "legacy",
    }
}

fn kind_label(kind: SpanKind) -> String {
    match kind {
        SpanKind::Record(kind) => kind.label().to_owned(),
        SpanKind::Fragment(kind) => format!("{} (fragment)", kind.label()),
        SpanKind::Zero => "zero".to_owned(),
        SpanKind::Opaque => "opaque".to_owned(),
        SpanKind::Uninitialized => "uninitialized".to_owned(),
    }
}
