use std::fmt;

/// Maximum length of a compile or link diagnostic surfaced to the user.
pub const SHADER_LOG_SIZE: usize = 1024;

/// Pipeline stage a shader object was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Failures raised while bringing the pipeline up.
///
/// Every variant is fatal for the object being constructed; the graph never
/// runs with a partially initialised pass.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Drawing surface, adapter, or device could not be created.
    #[error("failed to create rendering context: {0}")]
    Context(String),
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link: {log}")]
    Link { log: String },
    /// Incomplete framebuffer, missing or unreadable file.
    #[error("{0}")]
    Resource(String),
}

impl RenderError {
    pub(crate) fn compile(stage: ShaderStage, log: impl Into<String>) -> Self {
        Self::Compile {
            stage,
            log: bound_log(log.into()),
        }
    }

    pub(crate) fn link(log: impl Into<String>) -> Self {
        Self::Link {
            log: bound_log(log.into()),
        }
    }

    /// Diagnostic text attached to a compile or link failure.
    pub fn log(&self) -> Option<&str> {
        match self {
            RenderError::Compile { log, .. } | RenderError::Link { log } => Some(log),
            _ => None,
        }
    }
}

/// Truncates a diagnostic to [`SHADER_LOG_SIZE`] bytes without splitting a char.
pub(crate) fn bound_log(mut log: String) -> String {
    if log.len() > SHADER_LOG_SIZE {
        let mut cut = SHADER_LOG_SIZE;
        while !log.is_char_boundary(cut) {
            cut -= 1;
        }
        log.truncate(cut);
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_are_bounded_on_char_boundaries() {
        let long = "é".repeat(SHADER_LOG_SIZE);
        let bounded = bound_log(long);
        assert!(bounded.len() <= SHADER_LOG_SIZE);
        assert!(bounded.chars().all(|c| c == 'é'));

        let short = bound_log("short".to_string());
        assert_eq!(short, "short");
    }

    #[test]
    fn compile_error_carries_stage_and_log() {
        let err = RenderError::compile(ShaderStage::Fragment, "0:3: syntax error");
        assert_eq!(err.log(), Some("0:3: syntax error"));
        assert!(err.to_string().starts_with("fragment shader failed to compile"));
    }
}
