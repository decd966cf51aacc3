use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

/// Load `<member name="..."><summary>` texts from the documentation file a
/// compiler drops next to the module, keyed by doc id with any parameter
/// list stripped (`M:Ns.Type.Method(System.String)` -> `M:Ns.Type.Method`).
///
/// A missing or unreadable doc file simply yields no descriptions.
#[must_use]
pub fn load_summaries(doc_path: &Path) -> HashMap<String, String> {
    match std::fs::read_to_string(doc_path) {
        Ok(xml) => parse_summaries(&xml),
        Err(_) => HashMap::new(),
    }
}

#[must_use]
pub fn parse_summaries(xml: &str) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut summaries = HashMap::new();
    let mut current: Option<String> = None;
    let mut in_summary = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"member" => {
                    current = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"name")
                        .and_then(|a| a.unescape_value().ok())
                        .map(|v| strip_parameter_list(&v));
                }
                b"summary" if current.is_some() => {
                    in_summary = true;
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_summary => {
                if let Ok(chunk) = t.unescape() {
                    text.push_str(&chunk);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"summary" if in_summary => {
                    in_summary = false;
                    if let Some(id) = current.take() {
                        let summary = normalize_whitespace(&text);
                        if !summary.is_empty() {
                            summaries.insert(id, summary);
                        }
                    }
                }
                b"member" => {
                    current = None;
                    in_summary = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                log::warn!("stopping doc-comment read on malformed xml: {err}");
                break;
            }
            _ => {}
        }
    }

    summaries
}

fn strip_parameter_list(doc_id: &str) -> String {
    match doc_id.find('(') {
        Some(paren) => doc_id[..paren].to_string(),
        None => doc_id.to_string(),
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
