//! Wire form of instructions
//!
//! Every instruction encodes to a JSON object with exactly one key, the
//! instruction's wire key. The value is `true` for parameterless instructions,
//! a scalar for single-parameter ones, and an object of named parameters
//! otherwise:
//!
//! ```json
//! [
//!   {"prompt": "a cat"},
//!   {"config": {"steps": 20}},
//!   {"loop": {"loop": 3, "start": 0}},
//!   {"loopSave": "v_"},
//!   {"loopEnd": true}
//! ]
//! ```
//!
//! Decoding is strict: unknown keys, extra keys and mistyped parameters are
//! rejected, so a malformed instruction never reaches the executor.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::instruction::{Instruction, WorkflowInstruction};

/// Errors produced while decoding instructions
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Instruction must be a JSON object")]
    NotAnObject,

    #[error("Instruction must have exactly one key, found {0}")]
    ExpectedSingleKey(usize),

    #[error("Unknown instruction '{0}'")]
    UnknownKey(String),

    #[error("Invalid value for '{key}': expected {expected}")]
    InvalidValue { key: String, expected: String },

    #[error("Workflow must be a JSON array of instructions")]
    NotAList,

    #[error("Instruction {index}: {source}")]
    AtIndex {
        index: usize,
        #[source]
        source: Box<DecodeError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecodeError {
    fn invalid(key: &str, expected: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            expected: expected.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoopParams {
    #[serde(rename = "loop")]
    count: u32,
    #[serde(default)]
    start: u32,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveScaleParams {
    x: f64,
    y: f64,
    #[serde(default = "default_scale")]
    scale: f64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AdaptSizeParams {
    max_width: u32,
    max_height: u32,
}

const WEIGHT_KEY_PREFIX: &str = "index_";

/// Encode an instruction to its single-key wire object
pub fn encode(instruction: &Instruction) -> Value {
    let value = match instruction {
        Instruction::Note { text }
        | Instruction::Prompt { text }
        | Instruction::NegativePrompt { text } => Value::String(text.clone()),
        Instruction::CanvasLoad { filename }
        | Instruction::CanvasSave { filename }
        | Instruction::MoodboardAdd { filename }
        | Instruction::MaskLoad { filename } => Value::String(filename.clone()),
        Instruction::LoopAddMoodboard { folder } | Instruction::LoopLoad { folder } => {
            Value::String(folder.clone())
        }
        Instruction::LoopSave { prefix } => Value::String(prefix.clone()),
        Instruction::MaskAsk { description } | Instruction::AskZoom { description } => {
            Value::String(description.clone())
        }
        Instruction::Loop { count, start } => params(&LoopParams {
            count: *count,
            start: *start,
        }),
        Instruction::Config(config) => params(config),
        Instruction::Frames { count } => json!(count),
        Instruction::MoveScale { x, y, scale } => params(&MoveScaleParams {
            x: *x,
            y: *y,
            scale: *scale,
        }),
        Instruction::AdaptSize {
            max_width,
            max_height,
        } => params(&AdaptSizeParams {
            max_width: *max_width,
            max_height: *max_height,
        }),
        Instruction::MoodboardRemove { index } => json!(index),
        Instruction::MoodboardWeights { weights } => Value::Object(
            weights
                .iter()
                .map(|(index, weight)| (format!("{WEIGHT_KEY_PREFIX}{index}"), json!(weight)))
                .collect(),
        ),
        Instruction::MaskBody(mask) => params(mask),
        Instruction::PoseJson { data } => data.clone(),
        Instruction::InpaintTools(tools) => params(tools),
        Instruction::XlMagic(magic) => params(magic),
        Instruction::LoopEnd
        | Instruction::End
        | Instruction::CanvasClear
        | Instruction::Crop
        | Instruction::MoodboardClear
        | Instruction::MoodboardCanvas
        | Instruction::MaskClear
        | Instruction::MaskGet
        | Instruction::MaskBackground
        | Instruction::MaskForeground
        | Instruction::DepthExtract
        | Instruction::DepthCanvas
        | Instruction::DepthToCanvas
        | Instruction::PoseExtract
        | Instruction::RemoveBackground
        | Instruction::FaceZoom
        | Instruction::Generate => Value::Bool(true),
    };

    let mut object = Map::with_capacity(1);
    object.insert(instruction.key().to_string(), value);
    Value::Object(object)
}

/// Decode a single-key wire object
pub fn decode(value: &Value) -> Result<Instruction, DecodeError> {
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let mut entries = object.iter();
    let (key, value) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => return Err(DecodeError::ExpectedSingleKey(object.len())),
    };
    let key = key.as_str();

    let instruction = match key {
        "note" => Instruction::Note {
            text: string(key, value)?,
        },
        "loop" => {
            let LoopParams { count, start } = match value {
                Value::Number(_) => LoopParams {
                    count: unsigned(key, value)?,
                    start: 0,
                },
                _ => typed(key, value, "{\"loop\": count, \"start\": index}")?,
            };
            Instruction::Loop { count, start }
        }
        "loopEnd" => flag(key, value, Instruction::LoopEnd)?,
        "end" => flag(key, value, Instruction::End)?,
        "prompt" => Instruction::Prompt {
            text: string(key, value)?,
        },
        "negativePrompt" => Instruction::NegativePrompt {
            text: string(key, value)?,
        },
        "config" => Instruction::Config(typed(key, value, "generation settings object")?),
        "frames" => Instruction::Frames {
            count: unsigned(key, value)?,
        },
        "canvasClear" => flag(key, value, Instruction::CanvasClear)?,
        "canvasLoad" => Instruction::CanvasLoad {
            filename: string(key, value)?,
        },
        "canvasSave" => Instruction::CanvasSave {
            filename: string(key, value)?,
        },
        "moveScale" => {
            let MoveScaleParams { x, y, scale } = typed(key, value, "{x, y, scale}")?;
            Instruction::MoveScale { x, y, scale }
        }
        "adaptSize" => {
            let AdaptSizeParams {
                max_width,
                max_height,
            } = typed(key, value, "{maxWidth, maxHeight}")?;
            Instruction::AdaptSize {
                max_width,
                max_height,
            }
        }
        "crop" => flag(key, value, Instruction::Crop)?,
        "moodboardClear" => flag(key, value, Instruction::MoodboardClear)?,
        "moodboardCanvas" => flag(key, value, Instruction::MoodboardCanvas)?,
        "moodboardAdd" => Instruction::MoodboardAdd {
            filename: string(key, value)?,
        },
        "moodboardRemove" => Instruction::MoodboardRemove {
            index: unsigned::<usize>(key, value)?,
        },
        "moodboardWeights" => Instruction::MoodboardWeights {
            weights: weights(key, value)?,
        },
        "loopAddMB" => Instruction::LoopAddMoodboard {
            folder: string(key, value)?,
        },
        "maskClear" => flag(key, value, Instruction::MaskClear)?,
        "maskLoad" => Instruction::MaskLoad {
            filename: string(key, value)?,
        },
        "maskGet" => flag(key, value, Instruction::MaskGet)?,
        "maskBackground" => flag(key, value, Instruction::MaskBackground)?,
        "maskForeground" => flag(key, value, Instruction::MaskForeground)?,
        "maskBody" => Instruction::MaskBody(typed(key, value, "{upper, lower, clothes, neck}")?),
        "maskAsk" => Instruction::MaskAsk {
            description: string(key, value)?,
        },
        "depthExtract" => flag(key, value, Instruction::DepthExtract)?,
        "depthCanvas" => flag(key, value, Instruction::DepthCanvas)?,
        "depthToCanvas" => flag(key, value, Instruction::DepthToCanvas)?,
        "poseExtract" => flag(key, value, Instruction::PoseExtract)?,
        "poseJSON" => Instruction::PoseJson {
            data: value.clone(),
        },
        "removeBackground" => flag(key, value, Instruction::RemoveBackground)?,
        "faceZoom" => flag(key, value, Instruction::FaceZoom)?,
        "askZoom" => Instruction::AskZoom {
            description: string(key, value)?,
        },
        "inpaintTools" => Instruction::InpaintTools(typed(
            key,
            value,
            "{strength, maskBlur, maskBlurOutset, restoreOriginal}",
        )?),
        "xlMagic" => Instruction::XlMagic(typed(key, value, "{original, target, negative}")?),
        "loopLoad" => Instruction::LoopLoad {
            folder: string(key, value)?,
        },
        "loopSave" => Instruction::LoopSave {
            prefix: string(key, value)?,
        },
        "generate" => flag(key, value, Instruction::Generate)?,
        other => return Err(DecodeError::UnknownKey(other.to_string())),
    };

    Ok(instruction)
}

/// Parse a workflow file: a JSON array of wire objects
///
/// Every entry gets a fresh identity.
pub fn decode_workflow(json: &str) -> Result<Vec<WorkflowInstruction>, DecodeError> {
    let value: Value = serde_json::from_str(json)?;
    let items = value.as_array().ok_or(DecodeError::NotAList)?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            decode(item)
                .map(WorkflowInstruction::new)
                .map_err(|source| DecodeError::AtIndex {
                    index,
                    source: Box::new(source),
                })
        })
        .collect()
}

/// Render a workflow as a pretty-printed JSON array of wire objects
pub fn encode_workflow<I: AsRef<Instruction>>(instructions: &[I]) -> Result<String, DecodeError> {
    let values: Vec<Value> = instructions.iter().map(|i| encode(i.as_ref())).collect();
    Ok(serde_json::to_string_pretty(&values)?)
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        encode(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode(&value).map_err(serde::de::Error::custom)
    }
}

// Parameter structs hold only numbers, strings and options, so conversion to
// a `Value` cannot fail; an empty object is never observed in practice.
fn params<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn flag(key: &str, value: &Value, instruction: Instruction) -> Result<Instruction, DecodeError> {
    match value {
        Value::Bool(true) | Value::Null => Ok(instruction),
        Value::Object(map) if map.is_empty() => Ok(instruction),
        _ => Err(DecodeError::invalid(key, "true")),
    }
}

fn string(key: &str, value: &Value) -> Result<String, DecodeError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| DecodeError::invalid(key, "a string"))
}

fn unsigned<T: TryFrom<u64>>(key: &str, value: &Value) -> Result<T, DecodeError> {
    value
        .as_u64()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| DecodeError::invalid(key, "a non-negative integer"))
}

fn typed<T: DeserializeOwned>(key: &str, value: &Value, shape: &str) -> Result<T, DecodeError> {
    serde_json::from_value(value.clone())
        .map_err(|e| DecodeError::invalid(key, format!("{shape} ({e})")))
}

fn weights(key: &str, value: &Value) -> Result<BTreeMap<usize, f64>, DecodeError> {
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::invalid(key, "an object of index_N weights"))?;

    object
        .iter()
        .map(|(name, weight)| {
            let index = name
                .strip_prefix(WEIGHT_KEY_PREFIX)
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| DecodeError::invalid(key, format!("index_N keys, got '{name}'")))?;
            let weight = weight
                .as_f64()
                .ok_or_else(|| DecodeError::invalid(key, format!("a number for '{name}'")))?;
            Ok::<_, DecodeError>((index, weight))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BodyMask, InpaintTools, XlMagic};
    use generation::{GenerationConfig, LoraSpec};

    fn every_variant() -> Vec<Instruction> {
        vec![
            Instruction::Note {
                text: "remember the seed".into(),
            },
            Instruction::Loop { count: 5, start: 2 },
            Instruction::LoopEnd,
            Instruction::End,
            Instruction::Prompt {
                text: "a cat".into(),
            },
            Instruction::NegativePrompt {
                text: "blurry".into(),
            },
            Instruction::Config(GenerationConfig {
                width: Some(768),
                steps: Some(20),
                guidance_scale: Some(4.5),
                seed: Some(-1),
                model: Some("flux_1_schnell_q8p.ckpt".into()),
                loras: Some(vec![LoraSpec {
                    file: "detail.safetensors".into(),
                    weight: 0.6,
                }]),
                ..Default::default()
            }),
            Instruction::Frames { count: 24 },
            Instruction::CanvasClear,
            Instruction::CanvasLoad {
                filename: "in/base.png".into(),
            },
            Instruction::CanvasSave {
                filename: "out.png".into(),
            },
            Instruction::MoveScale {
                x: 12.5,
                y: -4.0,
                scale: 0.75,
            },
            Instruction::AdaptSize {
                max_width: 1024,
                max_height: 768,
            },
            Instruction::Crop,
            Instruction::MoodboardClear,
            Instruction::MoodboardCanvas,
            Instruction::MoodboardAdd {
                filename: "ref.jpg".into(),
            },
            Instruction::MoodboardRemove { index: 1 },
            Instruction::MoodboardWeights {
                weights: BTreeMap::from([(0, 1.0), (3, 0.25)]),
            },
            Instruction::LoopAddMoodboard {
                folder: "refs".into(),
            },
            Instruction::MaskClear,
            Instruction::MaskLoad {
                filename: "mask.png".into(),
            },
            Instruction::MaskGet,
            Instruction::MaskBackground,
            Instruction::MaskForeground,
            Instruction::MaskBody(BodyMask {
                upper: Some(true),
                lower: Some(false),
                clothes: None,
                neck: Some(true),
            }),
            Instruction::MaskAsk {
                description: "the hat".into(),
            },
            Instruction::DepthExtract,
            Instruction::DepthCanvas,
            Instruction::DepthToCanvas,
            Instruction::PoseExtract,
            Instruction::PoseJson {
                data: json!({"people": [{"pose_keypoints_2d": [1, 2, 0.9]}]}),
            },
            Instruction::RemoveBackground,
            Instruction::FaceZoom,
            Instruction::AskZoom {
                description: "the left eye".into(),
            },
            Instruction::InpaintTools(InpaintTools {
                strength: Some(0.8),
                mask_blur: Some(4.0),
                mask_blur_outset: Some(2),
                restore_original: Some(false),
            }),
            Instruction::XlMagic(XlMagic {
                original: Some(1.0),
                target: None,
                negative: Some(0.5),
            }),
            Instruction::LoopLoad {
                folder: "frames".into(),
            },
            Instruction::LoopSave {
                prefix: "v_".into(),
            },
            Instruction::Generate,
        ]
    }

    #[test]
    fn test_round_trip_every_variant() {
        for instruction in every_variant() {
            let wire = encode(&instruction);
            let object = wire.as_object().unwrap();
            assert_eq!(object.len(), 1, "{wire}");
            assert!(object.contains_key(instruction.key()));

            let decoded = decode(&wire).unwrap();
            assert_eq!(decoded, instruction, "round trip of {}", instruction.key());
        }
    }

    #[test]
    fn test_canonical_examples() {
        assert_eq!(encode(&Instruction::CanvasClear), json!({"canvasClear": true}));
        assert_eq!(
            encode(&Instruction::Loop { count: 5, start: 0 }),
            json!({"loop": {"loop": 5, "start": 0}})
        );
        assert_eq!(
            encode(&Instruction::MoodboardWeights {
                weights: BTreeMap::from([(0, 1.0)])
            }),
            json!({"moodboardWeights": {"index_0": 1.0}})
        );
        assert_eq!(
            encode(&Instruction::AdaptSize {
                max_width: 512,
                max_height: 640
            }),
            json!({"adaptSize": {"maxWidth": 512, "maxHeight": 640}})
        );
    }

    #[test]
    fn test_loop_shorthand_and_default_start() {
        assert_eq!(
            decode(&json!({"loop": 4})).unwrap(),
            Instruction::Loop { count: 4, start: 0 }
        );
        assert_eq!(
            decode(&json!({"loop": {"loop": 4}})).unwrap(),
            Instruction::Loop { count: 4, start: 0 }
        );
    }

    #[test]
    fn test_rejects_malformed_instructions() {
        assert!(matches!(decode(&json!("generate")), Err(DecodeError::NotAnObject)));
        assert!(matches!(
            decode(&json!({"generate": true, "crop": true})),
            Err(DecodeError::ExpectedSingleKey(2))
        ));
        assert!(matches!(decode(&json!({})), Err(DecodeError::ExpectedSingleKey(0))));
        assert!(matches!(
            decode(&json!({"teleport": true})),
            Err(DecodeError::UnknownKey(k)) if k == "teleport"
        ));
        assert!(matches!(
            decode(&json!({"prompt": 3})),
            Err(DecodeError::InvalidValue { key, .. }) if key == "prompt"
        ));
        assert!(matches!(
            decode(&json!({"config": {"stepz": 3}})),
            Err(DecodeError::InvalidValue { key, .. }) if key == "config"
        ));
        assert!(matches!(
            decode(&json!({"moodboardWeights": {"first": 1.0}})),
            Err(DecodeError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode(&json!({"frames": -2})),
            Err(DecodeError::InvalidValue { .. })
        ));
        assert!(matches!(
            decode(&json!({"generate": false})),
            Err(DecodeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_move_scale_defaults_scale() {
        assert_eq!(
            decode(&json!({"moveScale": {"x": 1.0, "y": 2.0}})).unwrap(),
            Instruction::MoveScale {
                x: 1.0,
                y: 2.0,
                scale: 1.0
            }
        );
    }

    #[test]
    fn test_decode_workflow_reports_position() {
        let workflow = r#"[{"prompt": "a cat"}, {"bogus": true}]"#;
        match decode_workflow(workflow) {
            Err(DecodeError::AtIndex { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(*source, DecodeError::UnknownKey(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(matches!(
            decode_workflow(r#"{"prompt": "a cat"}"#),
            Err(DecodeError::NotAList)
        ));
    }

    #[test]
    fn test_workflow_file_round_trip() {
        let workflow: Vec<WorkflowInstruction> =
            every_variant().into_iter().map(WorkflowInstruction::new).collect();
        let text = encode_workflow(&workflow).unwrap();
        let decoded = decode_workflow(&text).unwrap();
        assert_eq!(decoded, workflow);
    }

    #[test]
    fn test_serde_impls_use_wire_form() {
        let instruction = Instruction::LoopSave {
            prefix: "v_".into(),
        };
        let value = serde_json::to_value(&instruction).unwrap();
        assert_eq!(value, json!({"loopSave": "v_"}));
        let back: Instruction = serde_json::from_value(value).unwrap();
        assert_eq!(back, instruction);
    }
}
