use crate::args::MacroArgs;
use crate::serializer::{serialize_macro_args, SerializeError};
use std::path::PathBuf;

/// One headless ImageJ run: `<exe> [--headless] -batch <macro> <args>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJInvocation {
    pub executable: PathBuf,
    pub macro_path: PathBuf,
    pub args: MacroArgs,
    pub headless: bool,
}

impl ImageJInvocation {
    pub fn new(
        executable: impl Into<PathBuf>,
        macro_path: impl Into<PathBuf>,
        args: MacroArgs,
    ) -> Self {
        Self {
            executable: executable.into(),
            macro_path: macro_path.into(),
            args,
            headless: true,
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Arguments after the executable
    pub fn argv(&self) -> Result<Vec<String>, SerializeError> {
        let arg_string = serialize_macro_args(&self.args)?;
        let mut argv = Vec::with_capacity(4);
        if self.headless {
            argv.push("--headless".to_string());
        }
        argv.push("-batch".to_string());
        argv.push(self.macro_path.to_string_lossy().into_owned());
        argv.push(arg_string);
        Ok(argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_batch_argv() {
        let invocation = ImageJInvocation::new(
            "/opt/Fiji.app/ImageJ-linux64",
            "macros/segmentation.ijm",
            MacroArgs::new("img.tif", "out.tif"),
        );
        assert_eq!(
            invocation.argv().unwrap(),
            vec!["--headless", "-batch", "macros/segmentation.ijm", "img.tif:out.tif"]
        );
    }

    #[test]
    fn test_windowed_argv() {
        let invocation =
            ImageJInvocation::new("ImageJ", "m.ijm", MacroArgs::new("a", "b")).headless(false);
        assert_eq!(invocation.argv().unwrap()[0], "-batch");
    }
}
