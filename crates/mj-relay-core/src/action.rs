//! Action resolution.
//!
//! Turns a raw submission plus the relay mode picked by the route into a
//! canonical `{action, target task, index}` triple.  Derivative actions can
//! arrive three ways: an explicit `change` body, a `"<taskId> <code>"`
//! shorthand, or an encoded plus-dialect `customId`.

use std::str::FromStr;

use strum::{AsRefStr, Display, EnumString};

use crate::error::RelayError;
use crate::schemas::request::MidjourneyRequest;

/// Canonical operation kind.  The string form is what the backend and the
/// price table use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Imagine,
    Describe,
    Shorten,
    Blend,
    Upscale,
    Variation,
    Reroll,
    Zoom,
    Inpaint,
    /// Placeholder step before the real mask submission; never charged.
    InpaintPre,
}

impl Action {
    /// Key into the price table, e.g. `mj_upscale`.
    pub fn charge_key(self) -> String {
        format!("mj_{}", self.as_ref().to_lowercase())
    }

    pub fn is_chargeable(self) -> bool {
        self != Action::InpaintPre
    }

    /// Whether the action operates on an existing task.
    pub fn is_derivative(self) -> bool {
        matches!(
            self,
            Action::Upscale
                | Action::Variation
                | Action::Reroll
                | Action::Zoom
                | Action::Inpaint
                | Action::InpaintPre
        )
    }
}

/// Submission endpoint flavour, taken from the last path segment of
/// `/mj/submit/{mode}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum RelayMode {
    Imagine,
    Describe,
    Shorten,
    Blend,
    Change,
    SimpleChange,
    Modal,
    /// Plus dialect: the action is encoded in `customId`.
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAction {
    pub action: Action,
    pub target_task_id: Option<String>,
    pub index: i32,
    /// Mode after plus-dialect conversion (`Action` becomes `Change`).
    pub mode: RelayMode,
}

/// Parsed `"<taskId> <code>"` shorthand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeParams {
    pub id: String,
    pub action: Action,
    pub index: i32,
}

/// Resolve `req` under `mode`, stamping the canonical action and index back
/// onto the request so a re-serialized body carries them.
pub fn resolve_action(
    mode: RelayMode,
    req: &mut MidjourneyRequest,
) -> Result<ResolvedAction, RelayError> {
    let mut mode = mode;
    if mode == RelayMode::Action {
        let (action, index) = convert_custom_id(&req.custom_id)?;
        req.action = action.to_string();
        req.index = index;
        mode = RelayMode::Change;
    }

    let resolved = match mode {
        RelayMode::Imagine => {
            if req.prompt.is_empty() {
                return Err(RelayError::Request("prompt_is_required"));
            }
            primary(Action::Imagine, mode)
        }
        RelayMode::Describe => primary(Action::Describe, mode),
        RelayMode::Shorten => primary(Action::Shorten, mode),
        RelayMode::Blend => primary(Action::Blend, mode),
        RelayMode::Change => {
            if req.task_id.is_empty() {
                return Err(RelayError::Request("task_id_is_required"));
            }
            if req.action.is_empty() {
                return Err(RelayError::Request("action_is_required"));
            }
            if req.index == 0 {
                return Err(RelayError::Request("index_is_required"));
            }
            if !(1..=4).contains(&req.index) {
                return Err(RelayError::Request("index_out_of_range"));
            }
            let action = Action::from_str(&req.action.to_uppercase())
                .ok()
                .filter(|a| a.is_derivative())
                .ok_or(RelayError::Request("unknown_action"))?;
            ResolvedAction {
                action,
                target_task_id: Some(req.task_id.clone()),
                index: req.index,
                mode,
            }
        }
        RelayMode::SimpleChange => {
            if req.content.is_empty() {
                return Err(RelayError::Request("content_is_required"));
            }
            let params = convert_simple_change(&req.content)
                .ok_or(RelayError::Request("content_parse_failed"))?;
            ResolvedAction {
                action: params.action,
                target_task_id: Some(params.id),
                index: params.index,
                mode,
            }
        }
        RelayMode::Modal => {
            if req.mask_base64.is_empty() {
                return Err(RelayError::Request("mask_base64_is_required"));
            }
            if req.task_id.is_empty() {
                return Err(RelayError::Request("task_id_is_required"));
            }
            ResolvedAction {
                action: Action::Inpaint,
                target_task_id: Some(req.task_id.clone()),
                index: req.index,
                mode,
            }
        }
        // converted to `Change` above
        RelayMode::Action => return Err(RelayError::Request("unknown_action")),
    };

    req.action = resolved.action.to_string();
    Ok(resolved)
}

fn primary(action: Action, mode: RelayMode) -> ResolvedAction {
    ResolvedAction {
        action,
        target_task_id: None,
        index: 0,
        mode,
    }
}

/// Parse the `"<taskId> <code>"` shorthand where `code` is `u1..u4`,
/// `v1..v4` or `r`.  Anything else yields `None`.
pub fn convert_simple_change(content: &str) -> Option<ChangeParams> {
    let parts: Vec<&str> = content.split(' ').collect();
    let [id, code] = parts.as_slice() else {
        return None;
    };
    if id.is_empty() {
        return None;
    }
    let code = code.to_lowercase();

    if code == "r" {
        return Some(ChangeParams {
            id: (*id).to_owned(),
            action: Action::Reroll,
            index: 0,
        });
    }

    let mut chars = code.chars();
    let action = match chars.next()? {
        'u' => Action::Upscale,
        'v' => Action::Variation,
        _ => return None,
    };
    let rest = chars.as_str();
    if rest.len() != 1 {
        return None;
    }
    let index: i32 = rest.parse().ok()?;
    if !(1..=4).contains(&index) {
        return None;
    }
    Some(ChangeParams {
        id: (*id).to_owned(),
        action,
        index,
    })
}

/// Decode a plus-dialect custom id such as
/// `MJ::JOB::upsample::2::3dbbd469-36af-4a0f-8f02-df6c579e7011` into an
/// action and index.
pub fn convert_custom_id(custom_id: &str) -> Result<(Action, i32), RelayError> {
    if custom_id.is_empty() {
        return Err(RelayError::Request("custom_id_is_required"));
    }
    let segments: Vec<&str> = custom_id.split("::").collect();
    let token = match segments.get(1) {
        Some(&"JOB") => segments.get(2).copied(),
        other => other.copied(),
    }
    .unwrap_or_default();

    if token.is_empty() {
        return Err(RelayError::Request("unknown_action"));
    }
    if token.contains("upsample") {
        let index = segments
            .get(3)
            .and_then(|s| s.parse::<i32>().ok())
            .ok_or(RelayError::Request("index_parse_failed"))?;
        Ok((Action::Upscale, index))
    } else if token.contains("variation") || token.contains("pan") {
        Ok((Action::Variation, 1))
    } else if token == "Outpaint" || token == "CustomZoom" {
        Ok((Action::Zoom, 1))
    } else if token == "Inpaint" {
        Ok((Action::InpaintPre, 1))
    } else {
        Err(RelayError::Request("unknown_action"))
    }
}
