use std::fmt;
use std::path::{Component, Path};

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Processor family of an analysis database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit ARM / AArch64.
    Arm,
    /// x86 / x86-64, named after IDA's `metapc` processor module.
    MetaPc,
}

impl Arch {
    /// Parses the wire name (`ARM` or `metapc`).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ARM" => Some(Self::Arm),
            "metapc" => Some(Self::MetaPc),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arm => "ARM",
            Self::MetaPc => "metapc",
        }
    }
}

/// Address width of an analysis database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitWidth {
    Bits32,
    Bits64,
}

impl BitWidth {
    pub fn from_bits(bits: i64) -> Option<Self> {
        match bits {
            32 => Some(Self::Bits32),
            64 => Some(Self::Bits64),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Bits32 => 32,
            Self::Bits64 => 64,
        }
    }

    /// Extension IDA expects for a database of this width.
    pub fn database_extension(self) -> &'static str {
        match self {
            Self::Bits32 => "idb",
            Self::Bits64 => "i64",
        }
    }

    /// File stem of the IDA executable that opens databases of this width.
    pub fn tool_stem(self) -> &'static str {
        match self {
            Self::Bits32 => "ida",
            Self::Bits64 => "ida64",
        }
    }
}

/// Task description as posted by the plugin.
///
/// Only the routing fields are decoded; the rest of the payload belongs to the
/// analysis script and is handed to it verbatim. Missing fields decode to
/// their zero value and are rejected later as an unsupported target.
///
/// The body must be a JSON object; `null` reads as an empty one. Keys match
/// `Arch`, `Bit` and `Version` ignoring ASCII case, and when a field appears
/// more than once the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRequest {
    pub arch: String,
    pub bit: i64,
    pub version: String,
}

impl<'de> Deserialize<'de> for TaskRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TaskRequestVisitor)
    }
}

struct TaskRequestVisitor;

impl<'de> Visitor<'de> for TaskRequestVisitor {
    type Value = TaskRequest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a task object")
    }

    fn visit_unit<E: de::Error>(self) -> Result<TaskRequest, E> {
        Ok(TaskRequest::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TaskRequest, A::Error> {
        let mut request = TaskRequest::default();
        while let Some(key) = map.next_key::<String>()? {
            // A null value leaves the field as it was.
            if key.eq_ignore_ascii_case("arch") {
                if let Some(arch) = map.next_value::<Option<String>>()? {
                    request.arch = arch;
                }
            } else if key.eq_ignore_ascii_case("bit") {
                if let Some(bit) = map.next_value::<Option<i64>>()? {
                    request.bit = bit;
                }
            } else if key.eq_ignore_ascii_case("version") {
                if let Some(version) = map.next_value::<Option<String>>()? {
                    request.version = version;
                }
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(request)
    }
}

impl TaskRequest {
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    /// Validated target, or `None` when the combination is not one we ship
    /// databases for.
    ///
    /// The version names a directory under the versions root, so it must be a
    /// single plain path component.
    pub fn target(&self) -> Option<Target> {
        let arch = Arch::parse(&self.arch)?;
        let bits = BitWidth::from_bits(self.bit)?;
        if !is_plain_component(&self.version) {
            return None;
        }
        Some(Target {
            arch,
            bits,
            version: self.version.clone(),
        })
    }
}

fn is_plain_component(s: &str) -> bool {
    let mut components = Path::new(s).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(c)), None) if c == s
    )
}

/// A supported `(arch, bits, version)` combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub arch: Arch,
    pub bits: BitWidth,
    pub version: String,
}

impl Target {
    /// File name of the template database shipped for this target.
    pub fn artifact_name(&self) -> &'static str {
        match (self.arch, self.bits) {
            (Arch::Arm, BitWidth::Bits32) => "main_arm.idb",
            (Arch::Arm, BitWidth::Bits64) => "main_arm64.i64",
            (Arch::MetaPc, BitWidth::Bits32) => "main_x86.idb",
            (Arch::MetaPc, BitWidth::Bits64) => "main_x86_64.i64",
        }
    }
}

/// Stable negative codes identifying the stage a task failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FailureCode {
    /// Request body is not a decodable task.
    MalformedRequest = -1,
    /// No workspace could be allocated.
    WorkspaceUnavailable = -2,
    /// No database for the target, or it could not be staged.
    UnsupportedTarget = -3,
    /// Analysis script could not be staged.
    ScriptStaging = -4,
    /// Request payload could not be staged.
    PayloadStaging = -5,
    /// The tool finished without producing an `mba` output.
    NoOutput = -6,
}

impl FailureCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Outputs handed back to the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultData {
    /// Serialized microcode produced by the script; opaque to the service.
    #[serde(default)]
    pub mba: String,
    /// Output of older script revisions that wrote a `result` file instead.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub result: String,
}

/// Response body for one task.
///
/// `code == 0` iff `payload.mba` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub code: i32,
    #[serde(default)]
    pub error: String,
    #[serde(rename = "warn", default)]
    pub warning: String,
    #[serde(rename = "data", default)]
    pub payload: ResultData,
}

impl TaskResult {
    pub fn failure(code: FailureCode, error: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            error: error.into(),
            warning: String::new(),
            payload: ResultData::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(arch: &str, bit: i64, version: &str) -> TaskRequest {
        TaskRequest {
            arch: arch.into(),
            bit,
            version: version.into(),
        }
    }

    #[test]
    fn decodes_wire_names_and_ignores_script_fields() {
        let raw = br#"{"Arch":"metapc","Bit":64,"Version":"v1","segments":[],"mba":"AAAA"}"#;
        let req = TaskRequest::from_slice(raw).unwrap();
        assert_eq!(req, request("metapc", 64, "v1"));
    }

    #[test]
    fn field_names_ignore_case() {
        let req = TaskRequest::from_slice(br#"{"arch":"ARM","bit":32,"version":"7.7"}"#).unwrap();
        assert_eq!(req, request("ARM", 32, "7.7"));
        let req = TaskRequest::from_slice(br#"{"ARCH":"metapc","bIt":64,"VeRsIoN":"v1"}"#).unwrap();
        assert_eq!(req, request("metapc", 64, "v1"));
    }

    #[test]
    fn last_duplicate_field_wins() {
        let req = TaskRequest::from_slice(br#"{"Arch":"ARM","arch":"metapc","Bit":32,"Bit":64}"#)
            .unwrap();
        assert_eq!(req.arch, "metapc");
        assert_eq!(req.bit, 64);
    }

    #[test]
    fn missing_fields_decode_to_zero_values() {
        let req = TaskRequest::from_slice(b"{}").unwrap();
        assert_eq!(req, TaskRequest::default());
        assert!(req.target().is_none());
    }

    #[test]
    fn null_body_and_null_fields_decode_to_zero_values() {
        assert_eq!(TaskRequest::from_slice(b"null").unwrap(), TaskRequest::default());
        let req = TaskRequest::from_slice(br#"{"Arch":null,"Bit":64,"Version":"v1"}"#).unwrap();
        assert_eq!(req, request("", 64, "v1"));
    }

    #[test]
    fn only_objects_are_requests() {
        let bodies: [&[u8]; 5] = [b"[]", br#"["metapc",64,"v1"]"#, b"\"metapc\"", b"64", b"true"];
        for raw in bodies {
            assert!(
                TaskRequest::from_slice(raw).is_err(),
                "{}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn rejects_mistyped_fields() {
        assert!(TaskRequest::from_slice(br#"{"Arch":"ARM","Bit":"64"}"#).is_err());
        assert!(TaskRequest::from_slice(br#"{"Arch":"ARM","Bit":64.5}"#).is_err());
        assert!(TaskRequest::from_slice(br#"{"arch":32}"#).is_err());
        assert!(TaskRequest::from_slice(b"not json").is_err());
    }

    #[test]
    fn maps_every_supported_target_to_its_database() {
        let cases = [
            ("ARM", 32, "main_arm.idb"),
            ("ARM", 64, "main_arm64.i64"),
            ("metapc", 32, "main_x86.idb"),
            ("metapc", 64, "main_x86_64.i64"),
        ];
        for (arch, bit, name) in cases {
            let target = request(arch, bit, "v1").target().unwrap();
            assert_eq!(target.artifact_name(), name, "{arch}:{bit}");
        }
    }

    #[test]
    fn rejects_unknown_arch_and_width() {
        assert!(request("ARM", 16, "v1").target().is_none());
        assert!(request("mips", 32, "v1").target().is_none());
        assert!(request("arm", 32, "v1").target().is_none());
    }

    #[test]
    fn version_must_be_a_single_component() {
        for version in ["", "..", ".", "a/b", "../v1", "/abs"] {
            assert!(request("ARM", 32, version).target().is_none(), "{version:?}");
        }
        assert!(request("ARM", 32, "7.7sp1").target().is_some());
    }

    #[test]
    fn result_serializes_with_wire_names() {
        let result = TaskResult {
            code: 0,
            error: String::new(),
            warning: String::new(),
            payload: ResultData {
                mba: "(a+b)".into(),
                result: String::new(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": 0, "error": "", "warn": "", "data": {"mba": "(a+b)"}})
        );
    }

    #[test]
    fn legacy_result_is_emitted_only_when_present() {
        let mut result = TaskResult::failure(FailureCode::NoOutput, "");
        result.payload.result = "QUJD".into();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["data"]["result"], "QUJD");
        assert_eq!(json["code"], -6);
    }

    #[test]
    fn failure_codes_are_stable() {
        let codes: Vec<i32> = [
            FailureCode::MalformedRequest,
            FailureCode::WorkspaceUnavailable,
            FailureCode::UnsupportedTarget,
            FailureCode::ScriptStaging,
            FailureCode::PayloadStaging,
            FailureCode::NoOutput,
        ]
        .into_iter()
        .map(FailureCode::code)
        .collect();
        assert_eq!(codes, vec![-1, -2, -3, -4, -5, -6]);
    }
}
