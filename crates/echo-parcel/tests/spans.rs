// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Span fields recorded by the transfer operations.
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::fmt;
use std::sync::{Arc, Mutex};

use echo_parcel::{Parcel, WireFormat};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

type Fields = Vec<(String, String)>;

#[derive(Clone, Default)]
struct SpanFields(Arc<Mutex<Vec<(String, Fields)>>>);

struct FieldList(Fields);

impl Visit for FieldList {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_owned(), format!("{value:?}")));
    }
}

impl<S: Subscriber> Layer<S> for SpanFields {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        let mut fields = FieldList(Vec::new());
        attrs.record(&mut fields);
        self.0
            .lock()
            .unwrap()
            .push((attrs.metadata().name().to_owned(), fields.0));
    }
}

fn field(spans: &[(String, Fields)], span: &str, name: &str) -> Option<String> {
    spans
        .iter()
        .filter(|(span_name, _)| span_name == span)
        .flat_map(|(_, fields)| fields)
        .find(|(field_name, _)| field_name == name)
        .map(|(_, value)| value.clone())
}

#[test]
fn unmarshal_and_append_record_their_range() {
    let mut source = Parcel::new();
    source.write_int(1).unwrap();
    source.write_int(2).unwrap();
    let bytes = source.marshal().unwrap();

    let layer = SpanFields::default();
    let recorded = Arc::clone(&layer.0);
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, || {
        let mut parcel = Parcel::new();
        parcel
            .unmarshal_as(WireFormat::Native, &bytes, 4, 4)
            .unwrap();
        parcel.append_from(&source, 0, 8).unwrap();
    });

    let spans = recorded.lock().unwrap().clone();
    assert_eq!(field(&spans, "unmarshal_as", "format").as_deref(), Some("Native"));
    assert_eq!(field(&spans, "unmarshal_as", "offset").as_deref(), Some("4"));
    assert_eq!(field(&spans, "unmarshal_as", "length").as_deref(), Some("4"));
    assert_eq!(field(&spans, "append_from", "offset").as_deref(), Some("0"));
    assert_eq!(field(&spans, "append_from", "length").as_deref(), Some("8"));
}
