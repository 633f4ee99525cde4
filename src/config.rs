use clap::Parser;
use gfx_hal::window;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Draws one white triangle")]
pub struct Config {
    #[clap(
        long,
        default_value_t = 1024,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Window width in physical pixels"
    )]
    pub width: u32,
    #[clap(
        long,
        default_value_t = 768,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Window height in physical pixels"
    )]
    pub height: u32,
    #[clap(long, default_value = "triangle", help = "Window title")]
    pub title: String,
    #[clap(
        long,
        default_value = "0,0,0,1",
        help = "Background as r,g,b,a in [0, 1]"
    )]
    pub clear_color: ClearColor,
    #[clap(long, help = "Log filter, e.g. \"debug\" or \"gfx_triangle=trace\"")]
    pub log_level: Option<String>,
}

impl Config {
    pub fn extent(&self) -> window::Extent2D {
        window::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor(pub [f32; 4]);

impl Default for ClearColor {
    fn default() -> Self {
        ClearColor([0.0, 0.0, 0.0, 1.0])
    }
}

impl FromStr for ClearColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let channels = s
            .split(',')
            .map(|c| {
                let c = c.trim();
                let v = c
                    .parse::<f32>()
                    .map_err(|_| format!("`{}` is not a number", c))?;
                if (0.0..=1.0).contains(&v) {
                    Ok(v)
                } else {
                    Err(format!("channel {} is outside [0, 1]", v))
                }
            })
            .collect::<Result<Vec<f32>, String>>()?;

        match channels[..] {
            [r, g, b, a] => Ok(ClearColor([r, g, b, a])),
            _ => Err(format!(
                "expected 4 channels (r,g,b,a), got {}",
                channels.len()
            )),
        }
    }
}

impl fmt::Display for ClearColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "{},{},{},{}", r, g, b, a)
    }
}
