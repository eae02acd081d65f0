pub mod display {
    use minifb::{Key, Window, WindowOptions};

    use bjtcpu_core::framebuffer::framebuffer::{FB_HEIGHT, FB_WIDTH, Framebuffer};

    /// Screen pixels per framebuffer pixel unless overridden.
    pub const SCALE: usize = 8;
    pub const TARGET_FPS: usize = 60;

    fn pack_rgb(rgb: [u8; 3]) -> u32 {
        ((rgb[0] as u32) << 16) | ((rgb[1] as u32) << 8) | rgb[2] as u32
    }

    /// Host-side view of the framebuffer. With no window attached it still
    /// renders into `buf`, so headless runs and tests see the same pixels.
    pub struct DisplayWindow {
        pub window: Option<Window>,
        pub buf: Vec<u32>,
        scale: usize,
    }

    impl DisplayWindow {
        pub fn new(title: &str, scale: usize) -> Result<DisplayWindow, minifb::Error> {
            let scale = scale.max(1);
            let mut window = Window::new(
                title,
                FB_WIDTH * scale,
                FB_HEIGHT * scale,
                WindowOptions::default(),
            )?;
            window.set_target_fps(TARGET_FPS);

            Ok(DisplayWindow {
                window: Some(window),
                buf: vec![0; FB_WIDTH * scale * FB_HEIGHT * scale],
                scale,
            })
        }

        pub fn headless(scale: usize) -> DisplayWindow {
            let scale = scale.max(1);
            DisplayWindow {
                window: None,
                buf: vec![0; FB_WIDTH * scale * FB_HEIGHT * scale],
                scale,
            }
        }

        pub fn is_headless(&self) -> bool {
            self.window.is_none()
        }

        pub fn width(&self) -> usize {
            FB_WIDTH * self.scale
        }

        pub fn height(&self) -> usize {
            FB_HEIGHT * self.scale
        }

        /// False once the window is closed or Escape is held. Headless
        /// displays never close.
        pub fn is_open(&self) -> bool {
            match &self.window {
                Some(window) => window.is_open() && !window.is_key_down(Key::Escape),
                None => true,
            }
        }

        pub fn blit(&mut self, fb: &Framebuffer) {
            let width = self.width();
            for y in 0..FB_HEIGHT {
                for x in 0..FB_WIDTH {
                    let colour = pack_rgb(fb.rgb_at(x, y));
                    for dy in 0..self.scale {
                        let row = (y * self.scale + dy) * width + x * self.scale;
                        self.buf[row..row + self.scale].fill(colour);
                    }
                }
            }
        }

        pub fn present(&mut self, fb: &Framebuffer) -> Result<(), minifb::Error> {
            self.blit(fb);
            let (width, height) = (self.width(), self.height());
            if let Some(window) = self.window.as_mut() {
                window.update_with_buffer(&self.buf, width, height)?;
            }
            Ok(())
        }
    }
}
