pub mod framebuffer {
    use crate::device::device::SignalSink;

    pub const FB_WIDTH: usize = 64;
    pub const FB_HEIGHT: usize = 64;
    pub const FB_CHANNELS: usize = 3;

    /// 64x64 RGB image filled one pixel per signal. The cursor walks rows
    /// left to right, top to bottom, and wraps back to the origin.
    #[derive(Clone)]
    pub struct Framebuffer {
        pixels: Vec<u8>,
        cursor_x: usize,
        cursor_y: usize,
    }

    impl Default for Framebuffer {
        fn default() -> Framebuffer {
            Framebuffer::new()
        }
    }

    /// Expand an RGB332 byte to three 8-bit channels.
    pub fn decode_colour(value: u8) -> [u8; 3] {
        let r = (value >> 5) & 0x7;
        let g = (value >> 2) & 0x7;
        let b = value & 0x3;
        [
            (r as u16 * 255 / 7) as u8,
            (g as u16 * 255 / 7) as u8,
            (b as u16 * 255 / 3) as u8,
        ]
    }

    impl Framebuffer {
        pub fn new() -> Framebuffer {
            Framebuffer {
                pixels: vec![0; FB_WIDTH * FB_HEIGHT * FB_CHANNELS],
                cursor_x: 0,
                cursor_y: 0,
            }
        }

        pub fn clear(&mut self) {
            self.pixels.fill(0);
            self.cursor_x = 0;
            self.cursor_y = 0;
        }

        pub fn pixels(&self) -> &[u8] {
            &self.pixels
        }

        pub fn cursor(&self) -> (usize, usize) {
            (self.cursor_x, self.cursor_y)
        }

        pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
            let pos = ((y % FB_HEIGHT) * FB_WIDTH + (x % FB_WIDTH)) * FB_CHANNELS;
            [self.pixels[pos], self.pixels[pos + 1], self.pixels[pos + 2]]
        }

        fn write_pixel(&mut self, colour: u8) {
            let pos = (self.cursor_y * FB_WIDTH + self.cursor_x) * FB_CHANNELS;
            self.pixels[pos..pos + FB_CHANNELS].copy_from_slice(&decode_colour(colour));

            self.cursor_x += 1;
            if self.cursor_x == FB_WIDTH {
                self.cursor_x = 0;
                self.cursor_y = (self.cursor_y + 1) % FB_HEIGHT;
            }
        }
    }

    impl SignalSink for Framebuffer {
        fn receive(&mut self, value: u8) {
            self.write_pixel(value);
        }
    }
}
