//! The settings tree pushed to pyright and served back on configuration
//! pulls.
//!
//! Pyright adopts configuration two ways: the session pushes the full tree
//! via `workspace/didChangeConfiguration` right after the handshake, and
//! the server may also pull named sections via `workspace/configuration`.
//! Both paths read from one [`Settings`] value.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

/// Type checking strictness, `python.analysis.typeCheckingMode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCheckingMode {
    Off,
    Basic,
    #[default]
    Standard,
    Strict,
}

/// `python.analysis.logLevel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AnalysisLogLevel {
    Error,
    Warning,
    #[default]
    Information,
    Trace,
}

/// The `python.analysis` section.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    pub auto_import_completions: bool,
    pub auto_search_paths: bool,
    pub extra_paths: Vec<String>,
    pub stub_path: String,
    pub diagnostic_mode: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub ignore: Vec<String>,
    pub diagnostic_severity_overrides: HashMap<String, String>,
    pub log_level: AnalysisLogLevel,
    pub type_checking_mode: TypeCheckingMode,
    pub typeshed_paths: Vec<String>,
    pub use_library_code_for_types: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            auto_import_completions: true,
            auto_search_paths: true,
            extra_paths: Vec::new(),
            stub_path: String::from("typings"),
            diagnostic_mode: String::from("openFilesOnly"),
            include: Vec::new(),
            exclude: Vec::new(),
            ignore: Vec::new(),
            diagnostic_severity_overrides: HashMap::new(),
            log_level: AnalysisLogLevel::default(),
            type_checking_mode: TypeCheckingMode::default(),
            typeshed_paths: Vec::new(),
            use_library_code_for_types: true,
        }
    }
}

/// The `python` section.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PythonSettings {
    pub analysis: AnalysisSettings,
    pub venv_path: String,
    pub python_path: String,
}

impl Default for PythonSettings {
    fn default() -> Self {
        Self {
            analysis: AnalysisSettings::default(),
            venv_path: String::new(),
            python_path: String::from("python"),
        }
    }
}

/// The `pyright` section: service-disable toggles and trace verbosity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PyrightSettings {
    pub disable_language_services: bool,
    pub disable_tagged_hints: bool,
    pub disable_organize_imports: bool,
    pub disable_pull_diagnostics: bool,
    pub trace: TraceSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceSettings {
    pub server: String,
}

impl Default for PyrightSettings {
    fn default() -> Self {
        Self {
            disable_language_services: false,
            disable_tagged_hints: false,
            disable_organize_imports: false,
            disable_pull_diagnostics: false,
            trace: TraceSettings {
                server: String::from("verbose"),
            },
        }
    }
}

/// The full settings tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    pub python: PythonSettings,
    pub pyright: PyrightSettings,
}

impl Settings {
    /// Defaults with an explicit interpreter path, the usual way a caller
    /// points the analysis at a virtual environment.
    #[must_use]
    pub fn with_python_path(python_path: &Path) -> Self {
        let mut settings = Self::default();
        settings.python.python_path = python_path.to_string_lossy().into_owned();
        settings
    }

    /// The full tree as JSON for the `didChangeConfiguration` push.
    #[must_use]
    pub fn to_push_payload(&self) -> serde_json::Value {
        serde_json::json!({ "settings": self })
    }

    /// Look up one named section for a `workspace/configuration` pull.
    ///
    /// Recognized sections: `python`, `pyright`, `python.analysis`.
    /// Unrecognized sections return `None` and are omitted from the reply
    /// entirely (see DESIGN.md).
    #[must_use]
    pub fn section(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "python" => serde_json::to_value(&self.python).ok(),
            "pyright" => serde_json::to_value(&self.pyright).ok(),
            "python.analysis" => serde_json::to_value(&self.python.analysis)
                .ok()
                .map(|analysis| serde_json::json!({ "analysis": analysis })),
            _ => None,
        }
    }

    /// Answer a `workspace/configuration` pull: an object keyed by each
    /// recognized requested section.
    pub(crate) fn configuration_reply(&self, params: Option<&serde_json::Value>) -> serde_json::Value {
        let mut reply = serde_json::Map::new();
        let items = params
            .and_then(|p| p.get("items"))
            .and_then(|i| i.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for item in items {
            let Some(section) = item.get("section").and_then(|s| s.as_str()) else {
                continue;
            };
            match section {
                "python.analysis" => {
                    if let Some(value) = self.section(section) {
                        // Nested under "python", matching the tree shape.
                        let entry = reply
                            .entry("python")
                            .or_insert_with(|| serde_json::json!({}));
                        if let Some(python) = entry.as_object_mut() {
                            python.insert(String::from("analysis"), value["analysis"].clone());
                        }
                    }
                }
                other => {
                    if let Some(value) = self.section(other) {
                        reply.insert(other.to_string(), value);
                    }
                }
            }
        }

        serde_json::Value::Object(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_tree_shape() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        let analysis = &json["python"]["analysis"];
        assert_eq!(analysis["autoImportCompletions"], true);
        assert_eq!(analysis["autoSearchPaths"], true);
        assert_eq!(analysis["stubPath"], "typings");
        assert_eq!(analysis["diagnosticMode"], "openFilesOnly");
        assert_eq!(analysis["logLevel"], "Information");
        assert_eq!(analysis["typeCheckingMode"], "standard");
        assert_eq!(analysis["useLibraryCodeForTypes"], true);
        assert!(analysis["diagnosticSeverityOverrides"].as_object().unwrap().is_empty());
        assert_eq!(json["python"]["pythonPath"], "python");
        assert_eq!(json["python"]["venvPath"], "");
        assert_eq!(json["pyright"]["disableLanguageServices"], false);
        assert_eq!(json["pyright"]["disableTaggedHints"], false);
        assert_eq!(json["pyright"]["disableOrganizeImports"], false);
        assert_eq!(json["pyright"]["disablePullDiagnostics"], false);
        assert_eq!(json["pyright"]["trace"]["server"], "verbose");
    }

    #[test]
    fn test_type_checking_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TypeCheckingMode::Strict).unwrap(),
            "strict"
        );
        assert_eq!(serde_json::to_value(TypeCheckingMode::Off).unwrap(), "off");
    }

    #[test]
    fn test_with_python_path() {
        let settings = Settings::with_python_path(&PathBuf::from("/venv/bin/python"));
        assert_eq!(settings.python.python_path, "/venv/bin/python");
    }

    #[test]
    fn test_push_payload_wraps_settings() {
        let payload = Settings::default().to_push_payload();
        assert!(payload["settings"]["python"].is_object());
        assert!(payload["settings"]["pyright"].is_object());
    }

    #[test]
    fn test_configuration_reply_known_sections() {
        let settings = Settings::default();
        let params = serde_json::json!({
            "items": [
                {"section": "python"},
                {"section": "pyright"}
            ]
        });
        let reply = settings.configuration_reply(Some(&params));
        let obj = reply.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(reply["python"]["pythonPath"], "python");
        assert_eq!(reply["pyright"]["trace"]["server"], "verbose");
    }

    #[test]
    fn test_configuration_reply_analysis_nests_under_python() {
        let settings = Settings::default();
        let params = serde_json::json!({"items": [{"section": "python.analysis"}]});
        let reply = settings.configuration_reply(Some(&params));
        assert_eq!(reply["python"]["analysis"]["typeCheckingMode"], "standard");
        assert!(reply.get("python.analysis").is_none());
    }

    #[test]
    fn test_configuration_reply_omits_unrecognized_sections() {
        let settings = Settings::default();
        let params = serde_json::json!({
            "items": [
                {"section": "python"},
                {"section": "editor.fontSize"}
            ]
        });
        let reply = settings.configuration_reply(Some(&params));
        let obj = reply.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("python"));
    }

    #[test]
    fn test_configuration_reply_without_items() {
        let settings = Settings::default();
        assert!(
            settings
                .configuration_reply(None)
                .as_object()
                .unwrap()
                .is_empty()
        );
        assert!(
            settings
                .configuration_reply(Some(&serde_json::json!({})))
                .as_object()
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_section_unknown_is_none() {
        assert!(Settings::default().section("rust-analyzer").is_none());
    }
}
