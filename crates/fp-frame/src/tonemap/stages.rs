//! Structured filter-graph stages, rendered to ffmpeg syntax on demand.

use std::fmt;

/// One filter in a linear chain, with ordered `key=value` options.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStage {
    pub name: String,
    pub options: Vec<(String, String)>,
}

impl FilterStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn opt(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.push((key.into(), value.to_string()));
        self
    }

    /// `format` stage selecting a pixel format.
    pub fn pixel_format(pix_fmt: &str) -> Self {
        Self::new("format").opt("pix_fmts", pix_fmt)
    }

    /// Value of option `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.options.iter().enumerate() {
            let sep = if i == 0 { '=' } else { ':' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

/// Render stages as a comma-separated `-vf` chain.
pub fn render_chain(stages: &[FilterStage]) -> String {
    stages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Copy device frames back to system memory for a CPU-side encoder.
///
/// `surface_bits` is the depth of the frames on the device: `hwdownload`
/// only accepts the surface's own layout, so deep surfaces come down as
/// P010/P012 and are converted to 8-bit on the CPU.
pub fn download_stages(surface_bits: u8) -> Vec<FilterStage> {
    let layout = match surface_bits {
        0..=8 => return vec![FilterStage::new("hwdownload"), FilterStage::pixel_format("nv12")],
        9..=10 => "p010le",
        _ => "p012le",
    };
    vec![
        FilterStage::new("hwdownload"),
        FilterStage::pixel_format(layout),
        FilterStage::pixel_format("yuv420p"),
    ]
}
