//! Typed argument/result payloads for the engine's remote procedures.
//!
//! Each pair below corresponds to one named remote procedure on the
//! `kiln-engine` RPC service. The runtime treats these as opaque payloads;
//! only the engine and this module agree on their shape.

use serde::{Deserialize, Serialize};

/// Arguments for `Ping`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingArgs {
    /// Arbitrary value echoed back by the engine.
    #[serde(default)]
    pub value: String,
}

/// Result of `Ping`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    #[serde(default)]
    pub value: String,
}

/// Arguments for `ListMethod`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMethodArgs {}

/// Result of `ListMethod`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListMethodResult {
    /// Names of every remote procedure the engine serves.
    #[serde(default)]
    pub method_name_list: Vec<String>,
}

/// One `name=value` argument passed to program evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmdArg {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Arguments for `ExecProgram`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecProgramArgs {
    /// Working directory the program is evaluated in.
    #[serde(default)]
    pub work_dir: String,

    /// Source files making up the program.
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Top-level arguments handed to the program.
    #[serde(default)]
    pub args: Vec<CmdArg>,

    /// Configuration overrides applied before evaluation.
    #[serde(default)]
    pub overrides: Vec<String>,

    /// Omit fields whose value is none.
    #[serde(default)]
    pub disable_none: bool,

    /// Emit mapping keys in sorted order.
    #[serde(default)]
    pub sort_keys: bool,
}

/// Result of `ExecProgram`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecProgramResult {
    /// Evaluation result rendered as JSON.
    #[serde(default)]
    pub json_result: String,

    /// Evaluation result rendered as YAML.
    #[serde(default)]
    pub yaml_result: String,

    /// Non-fatal messages the engine logged while evaluating.
    #[serde(default)]
    pub log_message: String,
}

/// Arguments for `FormatCode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatCodeArgs {
    pub source: String,
}

/// Result of `FormatCode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatCodeResult {
    #[serde(default)]
    pub formatted: String,
}

/// Arguments for `FormatPath`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatPathArgs {
    /// File or directory to format in place.
    pub path: String,
}

/// Result of `FormatPath`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatPathResult {
    /// Paths whose content changed.
    #[serde(default)]
    pub changed_paths: Vec<String>,
}

/// Arguments for `LintPath`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LintPathArgs {
    pub paths: Vec<String>,
}

/// Result of `LintPath`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LintPathResult {
    /// One human-readable finding per entry.
    #[serde(default)]
    pub results: Vec<String>,
}

/// Arguments for `ValidateCode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateCodeArgs {
    /// Data document to validate.
    #[serde(default)]
    pub data: String,

    /// Schema source text.
    #[serde(default)]
    pub code: String,

    /// Schema name to validate against.
    #[serde(default)]
    pub schema: String,

    /// Attribute the data document binds to.
    #[serde(default)]
    pub attribute_name: String,

    /// Data format: "json" or "yaml".
    #[serde(default)]
    pub format: String,
}

/// Result of `ValidateCode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateCodeResult {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub err_message: String,
}

/// Arguments for `OverrideFile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideFileArgs {
    /// File the overrides are applied to.
    pub file: String,

    /// Override specs, e.g. `config.image="nginx:latest"`.
    #[serde(default)]
    pub specs: Vec<String>,

    /// Extra import paths needed to resolve the overrides.
    #[serde(default)]
    pub import_paths: Vec<String>,
}

/// Result of `OverrideFile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideFileResult {
    #[serde(default)]
    pub result: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_program_args_serialize_shape() {
        let args = ExecProgramArgs {
            work_dir: "/work".into(),
            filenames: vec!["main.kiln".into()],
            args: vec![CmdArg {
                name: "env".into(),
                value: "prod".into(),
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(value["work_dir"], "/work");
        assert_eq!(value["filenames"][0], "main.kiln");
        assert_eq!(value["args"][0]["name"], "env");
    }

    #[test]
    fn test_result_fields_default_when_missing() {
        let result: ExecProgramResult = serde_json::from_str(r#"{"json_result":"{}"}"#).unwrap();
        assert_eq!(result.json_result, "{}");
        assert_eq!(result.yaml_result, "");
        assert_eq!(result.log_message, "");
    }

    #[test]
    fn test_ping_roundtrip() {
        let args = PingArgs {
            value: "hello".into(),
        };
        let json = serde_json::to_string(&args).unwrap();
        let back: PingArgs = serde_json::from_str(&json).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn test_validate_result_deserializes() {
        let result: ValidateCodeResult =
            serde_json::from_str(r#"{"success":false,"err_message":"missing field"}"#).unwrap();
        assert!(!result.success);
        assert_eq!(result.err_message, "missing field");
    }
}
