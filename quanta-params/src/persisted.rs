//! Persisted form of a parameter
//!
//! One `;`-delimited line with fields in this order: default value or
//! formula, default unit, override value or formula, override unit,
//! override-active flag, notes, id, modified-by, modified-on, name.
//! `\` escapes `;` and `\` inside a field. Trailing fields may be left out.

use crate::parameter::{Parameter, Track, TrackSource, TrackState};
use quanta_core::{QuantaError, Result};

const DELIMITER: char = ';';
const ESCAPE: char = '\\';

/// Split a persisted line into unescaped fields
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push(ESCAPE),
            },
            DELIMITER => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Join fields into a persisted line, escaping as needed
pub fn join_fields<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(DELIMITER);
        }
        for c in field.as_ref().chars() {
            if c == DELIMITER || c == ESCAPE {
                line.push(ESCAPE);
            }
            line.push(c);
        }
    }
    line
}

/// A value field: `[` means formula, a number means literal, other text
/// is a formula
fn source_from_field(value: &str, unit: &str) -> TrackSource {
    let trimmed = value.trim();
    if !trimmed.contains('[') {
        if let Ok(number) = trimmed.parse::<f64>() {
            return TrackSource::Literal {
                value: number,
                unit: unit.to_string(),
            };
        }
    }
    TrackSource::Formula {
        text: value.to_string(),
        unit: unit.to_string(),
    }
}

fn field_from_source(source: &TrackSource) -> String {
    match source {
        TrackSource::Literal { value, .. } => value.to_string(),
        TrackSource::Formula { text, .. } => text.clone(),
    }
}

fn parse_flag(flag: &str) -> Result<bool> {
    match flag.trim() {
        "" | "0" => Ok(false),
        "1" => Ok(true),
        other if other.eq_ignore_ascii_case("true") => Ok(true),
        other if other.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(QuantaError::parse(format!("invalid override flag '{}'", other))),
    }
}

impl Parameter {
    /// Rebuild a parameter from its persisted line.
    ///
    /// Nothing is buffered: the first `update_buffers` computes the values.
    pub fn from_persisted(line: &str) -> Result<Self> {
        let fields = split_fields(line);
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");

        let default_value = field(0);
        let default_source = if default_value.trim().is_empty() {
            TrackSource::Literal {
                value: 0.0,
                unit: field(1).to_string(),
            }
        } else {
            source_from_field(default_value, field(1))
        };

        let mut parameter = Parameter::unbuffered(field(6), default_source);
        if !field(2).trim().is_empty() {
            parameter.override_track = Some(TrackState::unbuffered(source_from_field(field(2), field(3))));
        }
        if parse_flag(field(4))? {
            if parameter.override_track.is_none() {
                return Err(QuantaError::parse(format!(
                    "parameter '{}' selects an override track it does not have",
                    field(6)
                )));
            }
            parameter.active = Track::Override;
        }
        parameter.notes = field(5).to_string();
        parameter.modified_by = field(7).to_string();
        parameter.modified_on = field(8).to_string();
        if !field(9).is_empty() {
            parameter.name = Some(field(9).to_string());
        }
        Ok(parameter)
    }

    /// Persisted line for this parameter, without trailing empty fields
    pub fn to_persisted(&self) -> String {
        let (override_value, override_unit) = match &self.override_track {
            Some(state) => (field_from_source(state.source()), state.source().unit().to_string()),
            None => (String::new(), String::new()),
        };
        let flag = if self.active == Track::Override { "1" } else { "0" };

        let mut fields = vec![
            field_from_source(self.default.source()),
            self.default.source().unit().to_string(),
            override_value,
            override_unit,
            flag.to_string(),
            self.notes.clone(),
            self.id.clone(),
            self.modified_by.clone(),
            self.modified_on.clone(),
            self.name.clone().unwrap_or_default(),
        ];
        while fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        join_fields(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_core::PassToken;
    use quanta_formula::{FormulaEvaluator, NoReferences};
    use quanta_units::QuantityRegistry;
    use std::sync::Arc;

    #[test]
    fn test_split_and_join() {
        assert_eq!(split_fields("a;b;;c"), vec!["a", "b", "", "c"]);
        assert_eq!(split_fields(r"x\;y;z\\"), vec!["x;y", r"z\"]);
        assert_eq!(split_fields(""), vec![""]);

        let fields = ["semi;colon", r"back\slash", "plain"];
        let line = join_fields(&fields);
        assert_eq!(line, r"semi\;colon;back\\slash;plain");
        assert_eq!(split_fields(&line), fields);
    }

    #[test]
    fn test_from_persisted_full() {
        let line = "12.5;kg;[base]*2;g;True;some\\; notes;p-1;alice;2024-01-01;Mass of thing";
        let p = Parameter::from_persisted(line).unwrap();
        assert_eq!(p.id(), "p-1");
        assert_eq!(p.name(), Some("Mass of thing"));
        assert_eq!(p.notes(), "some; notes");
        assert_eq!(p.modified_by(), "alice");
        assert_eq!(p.modified_on(), "2024-01-01");
        assert_eq!(p.active_track(), Track::Override);
        assert_eq!(
            p.track(Track::Default).unwrap().source(),
            &TrackSource::Literal { value: 12.5, unit: "kg".into() }
        );
        assert_eq!(
            p.track(Track::Override).unwrap().source(),
            &TrackSource::Formula { text: "[base]*2".into(), unit: "g".into() }
        );
    }

    #[test]
    fn test_from_persisted_short() {
        let p = Parameter::from_persisted("3;m").unwrap();
        assert_eq!(p.active_track(), Track::Default);
        assert!(p.track(Track::Override).is_none());
        assert_eq!(p.id(), "");
        assert_eq!(p.name(), None);

        // non-numeric text without a reference is still a formula
        let p = Parameter::from_persisted("2+3;;;;0").unwrap();
        assert!(p.track(Track::Default).unwrap().source().is_formula());
    }

    #[test]
    fn test_invalid_flag() {
        assert!(Parameter::from_persisted("1;kg;;;maybe").is_err());
        // override selected but missing
        assert!(Parameter::from_persisted("1;kg;;;1").is_err());
    }

    #[test]
    fn test_to_persisted_round_trip() {
        let line = r"1.5;kg;[a]\;x;;1;n;id-7;bob;today;Name";
        let p = Parameter::from_persisted(line).unwrap();
        assert_eq!(p.to_persisted(), line);

        let short = Parameter::from_persisted("4;m").unwrap();
        assert_eq!(short.to_persisted(), "4;m;;;0");
    }

    #[test]
    fn test_persisted_literal_is_buffered_on_update() {
        let registry = Arc::new(QuantityRegistry::builtin().unwrap());
        let evaluator = FormulaEvaluator::new(registry.clone());
        let mut p = Parameter::from_persisted("250;g;;;0;;w").unwrap();
        assert!(p.to_quantity_value().is_err());
        p.update_buffers(PassToken::mint(), &evaluator, &mut NoReferences).unwrap();
        let q = p.to_quantity_value().unwrap();
        assert!((q.magnitude - 0.25).abs() < 1e-12);
        assert_eq!(p.value_in_default_unit(&registry).unwrap(), 250.0);
    }
}
