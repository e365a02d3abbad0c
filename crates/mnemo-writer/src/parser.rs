// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tolerant XML parser for a provider's reply: zero or more `<observation>`
//! elements and at most one `<summary>` element. Unknown child elements and
//! surrounding whitespace are ignored rather than rejected, since providers
//! vary in exactly which extra tags they emit.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use mnemo_store::{NewObservation, NewSummary};
use mnemo_types::ObservationType;

use crate::error::Result;

#[derive(Debug, Default, Clone)]
pub struct ParsedResponse {
    pub observations: Vec<NewObservation>,
    pub summary: Option<NewSummary>,
}

#[derive(Default)]
struct ObsBuilder {
    kind: Option<String>,
    title: String,
    subtitle: Option<String>,
    narrative: Option<String>,
    facts: Vec<String>,
    concepts: Vec<String>,
    files_read: Vec<String>,
    files_modified: Vec<String>,
}

impl ObsBuilder {
    fn set_field(&mut self, tag: &str, text: &str) {
        match tag {
            "type" => self.kind = Some(text.to_string()),
            "title" => self.title = text.to_string(),
            "subtitle" if !text.is_empty() => self.subtitle = Some(text.to_string()),
            "narrative" if !text.is_empty() => self.narrative = Some(text.to_string()),
            "fact" if !text.is_empty() => self.facts.push(text.to_string()),
            "concept" if !text.is_empty() => self.concepts.push(text.to_string()),
            "file_read" if !text.is_empty() => self.files_read.push(text.to_string()),
            "file_modified" if !text.is_empty() => self.files_modified.push(text.to_string()),
            _ => {}
        }
    }

    fn build(self) -> NewObservation {
        NewObservation {
            kind: parse_observation_type(self.kind.as_deref()),
            title: self.title,
            subtitle: self.subtitle,
            narrative: self.narrative,
            facts: self.facts,
            concepts: self.concepts,
            files_read: self.files_read,
            files_modified: self.files_modified,
        }
    }
}

#[derive(Default)]
struct SummaryBuilder {
    request: String,
    investigated: String,
    learned: String,
    completed: String,
    next_steps: String,
    notes: Option<String>,
}

impl SummaryBuilder {
    fn set_field(&mut self, tag: &str, text: &str) {
        match tag {
            "request" => self.request = text.to_string(),
            "investigated" => self.investigated = text.to_string(),
            "learned" => self.learned = text.to_string(),
            "completed" => self.completed = text.to_string(),
            "next_steps" => self.next_steps = text.to_string(),
            "notes" if !text.is_empty() => self.notes = Some(text.to_string()),
            _ => {}
        }
    }

    fn build(self) -> NewSummary {
        NewSummary {
            request: self.request,
            investigated: self.investigated,
            learned: self.learned,
            completed: self.completed,
            next_steps: self.next_steps,
            notes: self.notes,
        }
    }
}

fn parse_observation_type(raw: Option<&str>) -> ObservationType {
    match raw.unwrap_or("other") {
        "discovery" => ObservationType::Discovery,
        "decision" => ObservationType::Decision,
        "bugfix" => ObservationType::Bugfix,
        "refactor" => ObservationType::Refactor,
        _ => ObservationType::Other,
    }
}

pub fn parse_response(xml: &str) -> Result<ParsedResponse> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut observations = Vec::new();
    let mut summary = None;
    let mut current_obs: Option<ObsBuilder> = None;
    let mut current_summary: Option<SummaryBuilder> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if name == "observation" {
                    current_obs = Some(ObsBuilder::default());
                } else if name == "summary" {
                    current_summary = Some(SummaryBuilder::default());
                }
                text_buf.clear();
            }
            Event::Text(t) => {
                text_buf.push_str(&t.unescape()?);
            }
            Event::CData(t) => {
                text_buf.push_str(&String::from_utf8_lossy(t.into_inner().as_ref()));
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let text = text_buf.trim().to_string();
                text_buf.clear();

                if name == "observation" {
                    if let Some(obs) = current_obs.take() {
                        observations.push(obs.build());
                    }
                } else if name == "summary" {
                    if let Some(summ) = current_summary.take() {
                        summary = Some(summ.build());
                    }
                } else if let Some(obs) = current_obs.as_mut() {
                    obs.set_field(&name, &text);
                } else if let Some(summ) = current_summary.as_mut() {
                    summ.set_field(&name, &text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(ParsedResponse { observations, summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_observation_with_narrative() {
        let xml = r#"<response>
            <observation>
                <type>discovery</type>
                <title>Wrote a.md</title>
                <narrative>Wrote a.md</narrative>
                <file_modified>a.md</file_modified>
            </observation>
        </response>"#;
        let parsed = parse_response(xml).unwrap();
        assert_eq!(parsed.observations.len(), 1);
        let obs = &parsed.observations[0];
        assert_eq!(obs.title, "Wrote a.md");
        assert_eq!(obs.narrative.as_deref(), Some("Wrote a.md"));
        assert_eq!(obs.files_modified, vec!["a.md".to_string()]);
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn parses_multiple_observations_preserving_order() {
        let xml = r#"<response>
            <observation><type>decision</type><title>first</title></observation>
            <observation><type>bugfix</type><title>second</title></observation>
        </response>"#;
        let parsed = parse_response(xml).unwrap();
        assert_eq!(parsed.observations.len(), 2);
        assert_eq!(parsed.observations[0].title, "first");
        assert_eq!(parsed.observations[1].title, "second");
    }

    #[test]
    fn parses_summary_with_notes() {
        let xml = r#"<response>
            <summary>
                <request>do x</request>
                <investigated>looked at y</investigated>
                <learned>z works</learned>
                <completed>did x</completed>
                <next_steps>ship it</next_steps>
                <notes>be careful</notes>
            </summary>
        </response>"#;
        let parsed = parse_response(xml).unwrap();
        let summary = parsed.summary.unwrap();
        assert_eq!(summary.request, "do x");
        assert_eq!(summary.notes.as_deref(), Some("be careful"));
    }

    #[test]
    fn ignores_unknown_child_elements() {
        let xml = r#"<response>
            <observation>
                <type>discovery</type>
                <title>ok</title>
                <confidence>0.9</confidence>
                <fact>some fact</fact>
            </observation>
        </response>"#;
        let parsed = parse_response(xml).unwrap();
        assert_eq!(parsed.observations[0].facts, vec!["some fact".to_string()]);
    }

    #[test]
    fn empty_response_yields_no_records() {
        let parsed = parse_response("<response></response>").unwrap();
        assert!(parsed.observations.is_empty());
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn unknown_observation_type_falls_back_to_other() {
        let xml = r#"<observation><type>mystery</type><title>t</title></observation>"#;
        let parsed = parse_response(xml).unwrap();
        assert_eq!(parsed.observations[0].kind, ObservationType::Other);
    }
}
