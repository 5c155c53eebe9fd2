use std::time::Duration;

use log::debug;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use crate::bgr_image::BgrImage;
use crate::error::BenchResult;

struct View {
    name: String,
    window: Window,
    pixels: Vec<u32>,
    width: usize,
    height: usize,
}

/// A set of named image windows, closed together after a key press.
#[derive(Default)]
pub struct Viewer {
    views: Vec<View>,
}

impl Viewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, name: &str, image: &BgrImage) -> BenchResult<()> {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let mut window = Window::new(
            name,
            width,
            height,
            WindowOptions {
                resize: false,
                ..Default::default()
            },
        )?;
        window.limit_update_rate(Some(Duration::from_millis(16)));

        let pixels = image.to_argb();
        window.update_with_buffer(&pixels, width, height)?;
        debug!("Opened window {name} ({width}x{height})");

        self.views.push(View {
            name: name.to_string(),
            window,
            pixels,
            width,
            height,
        });
        Ok(())
    }

    /// Keep all windows alive until a key is pressed in any of them or
    /// every window has been closed, then close them all.
    pub fn wait_key(mut self) -> BenchResult<Option<Key>> {
        loop {
            let mut any_open = false;
            for view in self.views.iter_mut().filter(|v| v.window.is_open()) {
                any_open = true;
                view.window
                    .update_with_buffer(&view.pixels, view.width, view.height)?;
                if let Some(&key) = view.window.get_keys_pressed(KeyRepeat::No).first() {
                    debug!("Key {:?} pressed in window {}", key, view.name);
                    return Ok(Some(key));
                }
            }
            if !any_open {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_viewer_returns_immediately() {
        let viewer = Viewer::new();
        assert_eq!(viewer.wait_key().unwrap(), None);
    }
}
