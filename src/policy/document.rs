//! Parsing of `module.xml` policy documents.
//!
//! Only the `<authdops>` element of a module document concerns the broker;
//! sibling elements describe the module to other services and are skipped.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{DaemonError, DaemonResult, DocumentErrorKind};

use super::glob::PathGlob;

/// Ownership and mode applied to files installed through a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub user: Option<String>,
    pub group: Option<String>,
    pub perms: Option<u32>,
}

/// One `<match>` entry: which staged sources may go to which destinations.
#[derive(Debug, Clone)]
pub struct FileRule {
    pub source: PathGlob,
    pub dest: PathGlob,
    /// `dest` widened to everything inside the directories it names.
    pub contents: PathGlob,
    pub attributes: FileAttributes,
}

/// Run-as constraints for a declared script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptPolicy {
    pub as_root: Option<bool>,
    pub as_user: Option<String>,
}

/// Everything a module is allowed to ask for.
#[derive(Debug, Clone, Default)]
pub struct ModulePolicy {
    pub module: String,
    /// Checked in document order; the first matching rule wins.
    pub fileops: Vec<FileRule>,
    pub scripts: HashMap<String, ScriptPolicy>,
    pub commands: HashSet<String>,
    pub command_classes: HashSet<String>,
    pub services: HashSet<String>,
    pub objects: HashMap<String, PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    FileOps,
    Scripts,
    Commands,
    CommandClasses,
    Services,
    Objects,
}

impl Section {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "fileops" => Some(Section::FileOps),
            "scripts" => Some(Section::Scripts),
            "commands" => Some(Section::Commands),
            "commandclasses" => Some(Section::CommandClasses),
            "services" => Some(Section::Services),
            "objects" => Some(Section::Objects),
            _ => None,
        }
    }

    fn item(self) -> &'static str {
        match self {
            Section::FileOps => "match",
            Section::Scripts => "script",
            Section::Commands => "command",
            Section::CommandClasses => "commandclass",
            Section::Services => "service",
            Section::Objects => "object",
        }
    }
}

/// An item element whose text content is still being collected.
struct PendingItem {
    section: Section,
    attributes: HashMap<String, String>,
    text: String,
}

fn malformed(message: impl Into<String>) -> DaemonError {
    DaemonError::Document {
        kind: DocumentErrorKind::Malformed {
            message: message.into(),
        },
    }
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn read_attributes(start: &BytesStart<'_>) -> DaemonResult<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        attributes.insert(key, value);
    }
    Ok(attributes)
}

impl ModulePolicy {
    /// Parse and validate a module document.
    pub fn parse(module: &str, xml: &str) -> DaemonResult<Self> {
        let mut policy = ModulePolicy {
            module: module.to_string(),
            ..Default::default()
        };

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<String> = Vec::new();
        let mut section: Option<Section> = None;
        let mut pending: Option<PendingItem> = None;
        let mut saw_root = false;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;

            match event {
                Event::Start(ref start) | Event::Empty(ref start) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    let name = element_name(start);
                    if stack.is_empty() {
                        if saw_root {
                            return Err(malformed("multiple root elements"));
                        }
                        saw_root = true;
                    }
                    let in_ops = stack.get(1).map(String::as_str) == Some("authdops");

                    match (stack.len(), in_ops) {
                        (2, true) => {
                            let found = Section::from_name(&name).ok_or_else(|| {
                                DaemonError::Document {
                                    kind: DocumentErrorKind::UnexpectedElement {
                                        element: name.clone(),
                                        parent: "authdops".to_string(),
                                    },
                                }
                            })?;
                            section = Some(found);
                        }
                        (3, true) => {
                            let current = section.ok_or_else(|| malformed("item outside section"))?;
                            if name != current.item() {
                                return Err(DaemonError::Document {
                                    kind: DocumentErrorKind::UnexpectedElement {
                                        element: name,
                                        parent: stack[2].clone(),
                                    },
                                });
                            }
                            pending = Some(PendingItem {
                                section: current,
                                attributes: read_attributes(start)?,
                                text: String::new(),
                            });
                        }
                        (depth, true) if depth > 3 => {
                            return Err(DaemonError::Document {
                                kind: DocumentErrorKind::UnexpectedElement {
                                    element: name,
                                    parent: stack[depth - 1].clone(),
                                },
                            });
                        }
                        _ => {}
                    }

                    if is_empty {
                        if let Some(item) = pending.take() {
                            policy.add_item(item)?;
                        }
                        if stack.len() == 2 && in_ops {
                            section = None;
                        }
                    } else {
                        stack.push(name);
                    }
                }
                Event::Text(text) => {
                    if let Some(item) = pending.as_mut() {
                        let text = text.unescape().map_err(|e| malformed(e.to_string()))?;
                        item.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    if let Some(item) = pending.as_mut() {
                        item.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::End(_) => {
                    let depth = stack.len();
                    let in_ops = stack.get(1).map(String::as_str) == Some("authdops");
                    if in_ops && depth == 4 {
                        if let Some(item) = pending.take() {
                            policy.add_item(item)?;
                        }
                    } else if in_ops && depth == 3 {
                        section = None;
                    }
                    stack.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !saw_root {
            return Err(malformed("document has no root element"));
        }
        if let Some(open) = stack.last() {
            return Err(malformed(format!("unclosed element <{}>", open)));
        }

        Ok(policy)
    }

    fn add_item(&mut self, item: PendingItem) -> DaemonResult<()> {
        let element = item.section.item();
        let id = required(&item.attributes, element, "id")?;

        match item.section {
            Section::FileOps => {
                let dest_text = item.text.trim();
                if dest_text.is_empty() {
                    return Err(DaemonError::Document {
                        kind: DocumentErrorKind::EmptyPath {
                            element: element.to_string(),
                            id,
                        },
                    });
                }
                let dest = PathGlob::new(dest_text)?;
                let contents = dest.contents()?;
                let perms = match item.attributes.get("perms") {
                    Some(text) => Some(parse_perms(text).ok_or_else(|| DaemonError::Document {
                        kind: DocumentErrorKind::InvalidAttribute {
                            element: element.to_string(),
                            attribute: "perms".to_string(),
                            value: text.clone(),
                        },
                    })?),
                    None => None,
                };
                self.fileops.push(FileRule {
                    source: PathGlob::new(&id)?,
                    dest,
                    contents,
                    attributes: FileAttributes {
                        user: optional(&item.attributes, "user"),
                        group: optional(&item.attributes, "group"),
                        perms,
                    },
                });
            }
            Section::Scripts => {
                let as_root = match item.attributes.get("asroot").map(String::as_str) {
                    None => None,
                    Some("true") => Some(true),
                    Some("false") => Some(false),
                    Some(other) => {
                        return Err(DaemonError::Document {
                            kind: DocumentErrorKind::InvalidAttribute {
                                element: element.to_string(),
                                attribute: "asroot".to_string(),
                                value: other.to_string(),
                            },
                        })
                    }
                };
                self.scripts.insert(
                    id,
                    ScriptPolicy {
                        as_root,
                        as_user: optional(&item.attributes, "asuser"),
                    },
                );
            }
            Section::Commands => {
                self.commands.insert(id);
            }
            Section::CommandClasses => {
                self.command_classes.insert(id);
            }
            Section::Services => {
                self.services.insert(id);
            }
            Section::Objects => {
                let path = item.text.trim();
                if path.is_empty() {
                    return Err(DaemonError::Document {
                        kind: DocumentErrorKind::EmptyPath {
                            element: element.to_string(),
                            id,
                        },
                    });
                }
                if !path.starts_with('/') {
                    return Err(DaemonError::Document {
                        kind: DocumentErrorKind::RelativeObjectPath {
                            id,
                            path: path.to_string(),
                        },
                    });
                }
                self.objects.insert(id, PathBuf::from(path));
            }
        }

        Ok(())
    }
}

fn required(
    attributes: &HashMap<String, String>,
    element: &str,
    attribute: &str,
) -> DaemonResult<String> {
    match attributes.get(attribute) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(DaemonError::Document {
            kind: DocumentErrorKind::MissingAttribute {
                element: element.to_string(),
                attribute: attribute.to_string(),
            },
        }),
    }
}

fn optional(attributes: &HashMap<String, String>, attribute: &str) -> Option<String> {
    attributes
        .get(attribute)
        .filter(|value| !value.is_empty())
        .cloned()
}

/// Octal permission bits, at most `07777`.
pub fn parse_perms(text: &str) -> Option<u32> {
    if text.is_empty() || !text.chars().all(|c| ('0'..='7').contains(&c)) {
        return None;
    }
    u32::from_str_radix(text, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
}
