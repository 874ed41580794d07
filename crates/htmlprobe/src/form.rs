//! HTML form introspection and submission encoding.
//!
//! A [`Form`] is read once from a `<form>` element. Its named `input`,
//! `select` and `textarea` descendants are grouped by name in document order
//! and each group is classified into a [`FormField`]. The first element of a
//! group decides its kind.

use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::client::{ParamValue, Params};
use crate::dom::{attr, tag_name, text_content};
use crate::result::{ProbeError, ProbeResult};

/// Value of a form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    /// Checkbox state
    Bool(bool),
    /// Single value
    Text(String),
    /// Checkbox group or multi-select values
    List(Vec<String>),
}

impl FormValue {
    /// Truthiness used for single checkboxes
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => !s.is_empty(),
            Self::List(v) => !v.is_empty(),
        }
    }

    fn into_single(self) -> ParamValue {
        match self {
            Self::Bool(b) => ParamValue::Single(b.to_string()),
            Self::Text(s) => ParamValue::Single(s),
            Self::List(v) => ParamValue::Multi(v),
        }
    }

    fn into_multi(self) -> ParamValue {
        match self {
            Self::List(v) => ParamValue::Multi(v),
            Self::Text(s) => ParamValue::Multi(vec![s]),
            Self::Bool(_) => ParamValue::Multi(Vec::new()),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for FormValue {
    fn from(values: Vec<String>) -> Self {
        Self::List(values)
    }
}

impl From<Vec<&str>> for FormValue {
    fn from(values: Vec<&str>) -> Self {
        Self::List(values.into_iter().map(str::to_string).collect())
    }
}

/// Form values keyed by field name
pub type FormValues = BTreeMap<String, FormValue>;

/// Build [`FormValues`] from name/value pairs
pub fn form_values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> FormValues
where
    K: Into<String>,
    V: Into<FormValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A named form control, or group of same-named controls, with its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormField {
    /// Radio buttons sharing a name
    RadioGroup {
        /// Value of the checked button
        checked: Option<String>,
    },
    /// Several checkboxes sharing a name
    CheckboxGroup {
        /// Values of the checked boxes
        checked: Vec<String>,
    },
    /// A lone checkbox
    Checkbox {
        /// Whether it carries `checked`
        checked: bool,
    },
    /// Any other `<input>`, or a `<textarea>`
    TextInput {
        /// Current value
        value: String,
    },
    /// `<select>` without `multiple`
    SingleSelect {
        /// Selected option value
        value: String,
    },
    /// `<select multiple>`
    MultiSelect {
        /// Selected option values
        values: Vec<String>,
    },
}

fn input_type(element: ElementRef<'_>) -> String {
    attr(element, "type").unwrap_or("text").trim().to_ascii_lowercase()
}

fn checkable_value(element: ElementRef<'_>) -> String {
    attr(element, "value").unwrap_or("on").to_string()
}

fn option_value(option: ElementRef<'_>) -> String {
    attr(option, "value").map_or_else(
        || text_content(option).trim().to_string(),
        str::to_string,
    )
}

fn options(select: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    select
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| tag_name(*el) == "option")
}

impl FormField {
    /// Classify a group of same-named controls, first element first.
    ///
    /// # Errors
    ///
    /// [`ProbeError::UnsupportedFieldType`] when the first element is not an
    /// `input`, `select` or `textarea`.
    pub fn classify(name: &str, elements: &[ElementRef<'_>]) -> ProbeResult<Self> {
        let Some(&first) = elements.first() else {
            return Err(ProbeError::UnknownField {
                name: name.to_string(),
            });
        };

        match tag_name(first) {
            "input" => Ok(match input_type(first).as_str() {
                "radio" => Self::RadioGroup {
                    checked: elements
                        .iter()
                        .find(|el| input_type(**el) == "radio" && attr(**el, "checked").is_some())
                        .map(|el| checkable_value(*el)),
                },
                "checkbox" if elements.len() > 1 => Self::CheckboxGroup {
                    checked: elements
                        .iter()
                        .filter(|el| {
                            input_type(**el) == "checkbox" && attr(**el, "checked").is_some()
                        })
                        .map(|el| checkable_value(*el))
                        .collect(),
                },
                "checkbox" => Self::Checkbox {
                    checked: attr(first, "checked").is_some(),
                },
                _ => Self::TextInput {
                    value: attr(first, "value").unwrap_or_default().to_string(),
                },
            }),
            "textarea" => Ok(Self::TextInput {
                value: text_content(first),
            }),
            "select" if attr(first, "multiple").is_some() => Ok(Self::MultiSelect {
                values: options(first)
                    .filter(|o| attr(*o, "selected").is_some())
                    .map(option_value)
                    .collect(),
            }),
            "select" => {
                let selected = options(first).find(|o| attr(*o, "selected").is_some());
                Ok(Self::SingleSelect {
                    value: selected
                        .or_else(|| options(first).next())
                        .map(option_value)
                        .unwrap_or_default(),
                })
            }
            tag => Err(ProbeError::UnsupportedFieldType {
                tag: tag.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Current value as it appears in a snapshot
    #[must_use]
    pub fn current_value(&self) -> FormValue {
        match self {
            Self::RadioGroup { checked } => FormValue::Text(checked.clone().unwrap_or_default()),
            Self::CheckboxGroup { checked } => FormValue::List(checked.clone()),
            Self::Checkbox { checked } => FormValue::Bool(*checked),
            Self::TextInput { value } | Self::SingleSelect { value } => {
                FormValue::Text(value.clone())
            }
            Self::MultiSelect { values } => FormValue::List(values.clone()),
        }
    }

    /// Request parameter for `value`, or `None` when the field is omitted
    #[must_use]
    pub fn encode(&self, name: &str, value: FormValue) -> Option<ParamValue> {
        match self {
            Self::RadioGroup { .. } | Self::SingleSelect { .. } | Self::TextInput { .. } => {
                Some(value.into_single())
            }
            Self::CheckboxGroup { .. } | Self::MultiSelect { .. } => Some(value.into_multi()),
            Self::Checkbox { .. } => value
                .is_truthy()
                .then(|| ParamValue::Single(name.to_string())),
        }
    }
}

/// The control that submits a form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    /// `name` attribute, if any
    pub name: Option<String>,
    /// `value` attribute, empty when absent
    pub value: String,
}

/// A form read from the DOM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Uppercased `method` attribute, `GET` when absent
    pub method: String,
    /// `action` attribute as written
    pub action: Option<String>,
    /// Fields in document order
    pub fields: Vec<(String, FormField)>,
    /// First submit control inside the form
    pub submitter: Option<Submitter>,
}

impl Form {
    /// Read a form from an element. Controls are collected from the
    /// element's descendants whatever its tag.
    ///
    /// # Errors
    ///
    /// [`ProbeError::UnsupportedFieldType`] from field classification.
    pub fn from_element(element: ElementRef<'_>) -> ProbeResult<Self> {
        let method = attr(element, "method")
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let action = attr(element, "action").map(str::to_string);

        let descendants: Vec<ElementRef<'_>> = element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .collect();

        let mut groups: Vec<(String, Vec<ElementRef<'_>>)> = Vec::new();
        for el in descendants
            .iter()
            .filter(|el| matches!(tag_name(**el), "input" | "select" | "textarea"))
        {
            let Some(name) = attr(*el, "name").filter(|n| !n.is_empty()) else {
                continue;
            };
            match groups.iter_mut().find(|(n, _)| n == name) {
                Some((_, members)) => members.push(*el),
                None => groups.push((name.to_string(), vec![*el])),
            }
        }

        let fields = groups
            .iter()
            .map(|(name, members)| Ok((name.clone(), FormField::classify(name, members)?)))
            .collect::<ProbeResult<Vec<_>>>()?;

        let submitter = descendants
            .iter()
            .find(|el| {
                attr(**el, "submit").is_some()
                    || attr(**el, "type").is_some_and(|t| t.eq_ignore_ascii_case("submit"))
            })
            .map(|el| Submitter {
                name: attr(*el, "name").map(str::to_string),
                value: attr(*el, "value").unwrap_or_default().to_string(),
            });

        Ok(Self {
            method,
            action,
            fields,
            submitter,
        })
    }

    /// Field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| field)
    }

    /// Field names in document order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// Current value of every field
    #[must_use]
    pub fn snapshot(&self) -> FormValues {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.current_value()))
            .collect()
    }

    /// Turn form values into request parameters.
    ///
    /// # Errors
    ///
    /// [`ProbeError::UnknownField`] when a value names a field the form
    /// doesn't have.
    pub fn encode_for_submit(&self, values: FormValues) -> ProbeResult<Params> {
        let mut encoded = Params::new();
        for (name, value) in values {
            let Some(field) = self.field(&name) else {
                tracing::warn!(field = %name, "value supplied for a field the form does not have");
                return Err(ProbeError::UnknownField { name });
            };
            if let Some(param) = field.encode(&name, value) {
                encoded.insert(name, param);
            }
        }
        Ok(encoded)
    }

    /// Parameters a browser would send: the snapshot with `overrides`
    /// applied, encoded, plus the first submitter's name and value.
    ///
    /// # Errors
    ///
    /// See [`Form::encode_for_submit`].
    pub fn submission(&self, overrides: FormValues) -> ProbeResult<Params> {
        let mut values = self.snapshot();
        values.extend(overrides);
        let mut encoded = self.encode_for_submit(values)?;
        if let Some(Submitter {
            name: Some(name),
            value,
        }) = &self.submitter
        {
            encoded.insert(name.clone(), ParamValue::Single(value.clone()));
        }
        Ok(encoded)
    }
}
