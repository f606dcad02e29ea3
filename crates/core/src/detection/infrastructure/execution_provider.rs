use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware backend an ONNX session is asked to run on.
///
/// ONNX Runtime silently falls back to CPU when the requested provider is
/// missing, so this is a preference rather than a guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionBackend {
    CoreMl,
    DirectMl,
    Cpu,
}

impl ExecutionBackend {
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            ExecutionBackend::CoreMl
        } else if cfg!(target_os = "windows") {
            ExecutionBackend::DirectMl
        } else {
            ExecutionBackend::Cpu
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExecutionBackend::CoreMl => "CoreML",
            ExecutionBackend::DirectMl => "DirectML",
            ExecutionBackend::Cpu => "CPU",
        }
    }

    /// Providers to register on the session builder, most preferred first.
    /// CPU needs none.
    pub fn providers(self) -> Vec<ExecutionProviderDispatch> {
        match self {
            #[cfg(target_os = "macos")]
            ExecutionBackend::CoreMl => {
                vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
            }
            #[cfg(target_os = "windows")]
            ExecutionBackend::DirectMl => {
                vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
            }
            _ => Vec::new(),
        }
    }
}
