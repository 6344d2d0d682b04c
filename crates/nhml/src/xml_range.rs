use std::path::Path;

use media_types::{ImportError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;

/// Extracts the byte range of an XML file delimited by two element
/// references of the form `id.start` / `id.end`, where `id` matches the
/// `id` or `DEF` attribute of an element. `doc.start` and `doc.end` refer
/// to the file bounds.
///
/// `start` flavors resolve to the byte offset of the element's opening
/// `<`; `end` flavors to the offset just past its end tag.
pub fn extract_xml_range(xml_file: &Path, from: &str, to: &str) -> Result<Vec<u8>> {
    let data = std::fs::read(xml_file)
        .map_err(|_| ImportError::UrlError(xml_file.display().to_string()))?;

    let from_pos = resolve_position(&data, from, 0)?;
    let to_pos = resolve_position(&data, to, data.len())?;
    if to_pos < from_pos {
        return Err(ImportError::BadParam(format!(
            "xmlFrom {from} is located after xmlTo {to}"
        )));
    }
    Ok(data[from_pos..to_pos].to_vec())
}

fn resolve_position(data: &[u8], reference: &str, doc_default: usize) -> Result<usize> {
    let (id, is_start) = match reference.rsplit_once('.') {
        Some((id, "start")) => (id, true),
        Some((id, "end")) => (id, false),
        _ => {
            return Err(ImportError::BadParam(format!(
                "bad XML range reference \"{reference}\""
            )));
        }
    };
    if id.eq_ignore_ascii_case("doc") {
        return Ok(if is_start { 0 } else { doc_default });
    }

    let mut reader = Reader::from_reader(data);
    let mut depth_stack: Vec<bool> = Vec::new();
    let mut pos_before = 0usize;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| ImportError::non_compliant(format!("SAX error: {e}")))?;
        let pos_after = reader.buffer_position() as usize;
        match event {
            Event::Start(ref start) => {
                let matched = element_id_matches(start, id);
                if matched && is_start {
                    return Ok(scan_back_to_open(data, pos_before, pos_after));
                }
                depth_stack.push(matched);
            }
            Event::Empty(ref start) => {
                let matched = element_id_matches(start, id);
                if matched {
                    return Ok(if is_start {
                        scan_back_to_open(data, pos_before, pos_after)
                    } else {
                        pos_after
                    });
                }
            }
            Event::End(_) => {
                if depth_stack.pop() == Some(true) && !is_start {
                    return Ok(pos_after);
                }
            }
            Event::Eof => {
                return Err(ImportError::BadParam(format!(
                    "XML range id \"{id}\" not found"
                )));
            }
            _ => {}
        }
        pos_before = pos_after;
    }
}

fn element_id_matches(start: &quick_xml::events::BytesStart<'_>, id: &str) -> bool {
    start.attributes().flatten().any(|attr| {
        let key = attr.key.as_ref();
        (key.eq_ignore_ascii_case(b"id") || key.eq_ignore_ascii_case(b"DEF"))
            && attr.value.as_ref() == id.as_bytes()
    })
}

/// The reader position after a start event points past `>`; walk back to the
/// opening `<` of the tag.
fn scan_back_to_open(data: &[u8], from: usize, after: usize) -> usize {
    let mut pos = after.min(data.len());
    while pos > from {
        pos -= 1;
        if data[pos] == b'<' {
            return pos;
        }
    }
    from
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOC: &str =
        "<root><unit id=\"a\"><x>1</x></unit><unit id=\"b\"><x>2</x></unit></root>";

    fn with_doc(f: impl FnOnce(&Path)) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();
        f(file.path());
    }

    #[test]
    fn element_range() {
        with_doc(|path| {
            let range = extract_xml_range(path, "a.start", "a.end").unwrap();
            assert_eq!(range, b"<unit id=\"a\"><x>1</x></unit>");
        });
    }

    #[test]
    fn cross_element_range() {
        with_doc(|path| {
            let range = extract_xml_range(path, "a.end", "b.end").unwrap();
            assert_eq!(range, b"<unit id=\"b\"><x>2</x></unit>");
        });
    }

    #[test]
    fn doc_bounds() {
        with_doc(|path| {
            let range = extract_xml_range(path, "doc.start", "doc.end").unwrap();
            assert_eq!(range, DOC.as_bytes());
        });
    }

    #[test]
    fn inverted_range_rejected() {
        with_doc(|path| {
            assert!(extract_xml_range(path, "b.start", "a.end").is_err());
        });
    }

    #[test]
    fn unknown_id_rejected() {
        with_doc(|path| {
            assert!(extract_xml_range(path, "zz.start", "doc.end").is_err());
        });
    }
}
