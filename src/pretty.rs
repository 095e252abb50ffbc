//! Re-indenting post-processing step.
//!
//! Streams a finished document through quick-xml's indenting writer
//! (two spaces). Whitespace-only text between elements is dropped; text
//! that carries content, together with its entity references, is kept as is.

use std::io::{BufReader, Read, Write};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{Error, Result};

/// Pretty-prints `input` into `output`.
pub fn pretty_print<R: Read, W: Write>(input: R, output: W) -> Result<()> {
    let mut reader = Reader::from_reader(BufReader::new(input));
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new_with_indent(output, b' ', 2);

    let mut buf = Vec::new();
    // Zusammenhaengender Text (Text + GeneralRef), erst beim naechsten Markup entschieden.
    let mut pending: Vec<Event<'static>> = Vec::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::XmlParseError(format!(
                "parse XML error at {:?}: {e}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Eof => break,
            Event::Text(_) | Event::GeneralRef(_) => pending.push(event.into_owned()),
            other => {
                flush_text(&mut writer, &mut pending)?;
                writer.write_event(other)?;
            }
        }
        buf.clear();
    }
    flush_text(&mut writer, &mut pending)?;

    writer.get_mut().flush()?;
    Ok(())
}

fn flush_text<W: Write>(writer: &mut Writer<W>, pending: &mut Vec<Event<'static>>) -> Result<()> {
    let whitespace_only = pending.iter().all(|e| match e {
        Event::Text(t) => t.iter().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n')),
        _ => false,
    });
    if whitespace_only {
        pending.clear();
        return Ok(());
    }
    for event in pending.drain(..) {
        writer.write_event(event)?;
    }
    Ok(())
}
