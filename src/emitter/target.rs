use std::str::FromStr;

use cranelift::prelude::{isa, settings, Configurable};
use serde::{Deserialize, Serialize};
use target_lexicon::Triple;

use crate::error::{EmitError, EmitResult};

/// Code generation effort.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub(crate) fn flag(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Machine the generated code runs on.
///
/// Only the host can be targeted, since compiled maps are executed in
/// process. `triple` may still name the host explicitly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetDescription {
    /// `"host"` or a target triple such as `x86_64-unknown-linux-gnu`.
    pub triple: String,
    pub opt_level: OptLevel,
    /// ISA features to enable on top of the detected host features.
    #[serde(default)]
    pub features: Vec<String>,
    /// Preferred vector width in elements. Advisory.
    #[serde(default = "default_vector_width")]
    pub vector_width: usize,
}

fn default_vector_width() -> usize {
    4
}

impl Default for TargetDescription {
    fn default() -> Self {
        Self::host()
    }
}

impl TargetDescription {
    pub fn host() -> Self {
        Self {
            triple: "host".to_string(),
            opt_level: OptLevel::default(),
            features: Vec::new(),
            vector_width: default_vector_width(),
        }
    }

    pub fn with_triple(triple: impl Into<String>) -> Self {
        Self {
            triple: triple.into(),
            ..Self::host()
        }
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn resolve_triple(&self) -> EmitResult<Triple> {
        if self.triple == "host" {
            return Ok(Triple::host());
        }
        let triple = Triple::from_str(&self.triple).map_err(|e| EmitError::UnsupportedTarget {
            triple: self.triple.clone(),
            reason: e.to_string(),
        })?;
        if triple != Triple::host() {
            return Err(EmitError::UnsupportedTarget {
                triple: self.triple.clone(),
                reason: format!("only the host ({}) can execute compiled code", Triple::host()),
            });
        }
        Ok(triple)
    }

    /// Pointer width in bytes.
    pub fn pointer_bytes(&self) -> EmitResult<u8> {
        let triple = self.resolve_triple()?;
        triple
            .pointer_width()
            .map(|width| width.bytes())
            .map_err(|_| EmitError::UnsupportedTarget {
                triple: self.triple.clone(),
                reason: "unknown pointer width".to_string(),
            })
    }

    pub(crate) fn build_isa(&self) -> EmitResult<isa::OwnedTargetIsa> {
        self.resolve_triple()?;

        let codegen = |e: &dyn std::fmt::Display| EmitError::Codegen(e.to_string());

        let mut flag_builder = settings::builder();
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(|e| codegen(&e))?;
        flag_builder.set("is_pic", "false").map_err(|e| codegen(&e))?;
        flag_builder
            .set("opt_level", self.opt_level.flag())
            .map_err(|e| codegen(&e))?;

        let mut isa_builder =
            cranelift_native::builder().map_err(|reason| EmitError::UnsupportedTarget {
                triple: self.triple.clone(),
                reason: reason.to_string(),
            })?;
        for feature in &self.features {
            isa_builder.enable(feature).map_err(|e| codegen(&e))?;
        }
        isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| codegen(&e))
    }
}
