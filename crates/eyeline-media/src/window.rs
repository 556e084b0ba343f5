//! The pixel window that shows photos and turns keyboard and mouse state
//! into [`InputEvent`]s for the correction sessions.

use crate::frame::to_framebuffer;
use crate::overlay;
use crate::{MediaError, Result};
use eyeline_core::correction::{Button, CoarseSession, CorrectionSurface, FineSession, InputEvent, Key};
use image::RgbImage;
use minifb::{KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use std::collections::VecDeque;

const TARGET_FPS: usize = 60;

/// Keys the sessions understand, from the window's key codes.
pub fn translate_key(key: minifb::Key) -> Option<Key> {
    use minifb::Key as K;
    let key = match key {
        K::Up => Key::Up,
        K::Down => Key::Down,
        K::Left => Key::Left,
        K::Right => Key::Right,
        K::Tab => Key::Tab,
        K::Space => Key::Space,
        K::Escape => Key::Escape,
        K::Equal | K::NumPadPlus => Key::Char('+'),
        K::Minus | K::NumPadMinus => Key::Char('-'),
        K::A => Key::Char('a'),
        K::B => Key::Char('b'),
        K::C => Key::Char('c'),
        K::D => Key::Char('d'),
        K::E => Key::Char('e'),
        K::F => Key::Char('f'),
        K::G => Key::Char('g'),
        K::H => Key::Char('h'),
        K::I => Key::Char('i'),
        K::J => Key::Char('j'),
        K::K => Key::Char('k'),
        K::L => Key::Char('l'),
        K::M => Key::Char('m'),
        K::N => Key::Char('n'),
        K::O => Key::Char('o'),
        K::P => Key::Char('p'),
        K::Q => Key::Char('q'),
        K::R => Key::Char('r'),
        K::S => Key::Char('s'),
        K::T => Key::Char('t'),
        K::U => Key::Char('u'),
        K::V => Key::Char('v'),
        K::W => Key::Char('w'),
        K::X => Key::Char('x'),
        K::Y => Key::Char('y'),
        K::Z => Key::Char('z'),
        _ => return None,
    };
    Some(key)
}

/// Turns sampled mouse state into press, move and release events.
#[derive(Debug, Default)]
struct PointerTracker {
    held: [bool; 2],
    pos: Option<(i32, i32)>,
}

impl PointerTracker {
    fn sample(&mut self, pos: Option<(i32, i32)>, down: [bool; 2], out: &mut VecDeque<InputEvent>) {
        let moved = pos.is_some() && pos != self.pos;
        if let Some(p) = pos {
            self.pos = Some(p);
        }
        let Some((x, y)) = self.pos else {
            return;
        };

        if moved && self.held.iter().any(|h| *h) {
            out.push_back(InputEvent::PointerMove { x, y });
        }

        for (slot, button) in [Button::Primary, Button::Secondary].into_iter().enumerate() {
            match (self.held[slot], down[slot]) {
                (false, true) => out.push_back(InputEvent::PointerDown { button, x, y }),
                (true, false) => out.push_back(InputEvent::PointerUp { button, x, y }),
                _ => {}
            }
            self.held[slot] = down[slot];
        }
    }
}

/// A non-resizable window sized to the image it shows.
pub struct PhotoWindow {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    pointer: PointerTracker,
    pending: VecDeque<InputEvent>,
}

impl PhotoWindow {
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let (width, height) = (width as usize, height as usize);
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;
        window.set_target_fps(TARGET_FPS);
        tracing::debug!(title, width, height, "window opened");

        Ok(Self {
            window,
            buffer: Vec::with_capacity(width * height),
            width,
            height,
            pointer: PointerTracker::default(),
            pending: VecDeque::new(),
        })
    }

    /// Replace the window contents. The image must match the window size.
    pub fn show(&mut self, image: &RgbImage) -> Result<()> {
        to_framebuffer(image, &mut self.buffer);
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    fn poll(&mut self) {
        self.window.update();
        let pos = self
            .window
            .get_mouse_pos(MouseMode::Clamp)
            .map(|(x, y)| (x as i32, y as i32));
        let down = [
            self.window.get_mouse_down(MouseButton::Left),
            self.window.get_mouse_down(MouseButton::Right),
        ];
        self.pointer.sample(pos, down, &mut self.pending);

        for key in self.window.get_keys_pressed(KeyRepeat::Yes) {
            if let Some(key) = translate_key(key) {
                self.pending.push_back(InputEvent::Key(key));
            }
        }
    }

    /// Block until the next input. A closed window reads as `q`.
    pub fn next_event(&mut self) -> Result<InputEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            if !self.window.is_open() {
                tracing::debug!("window closed, treating as quit");
                return Ok(InputEvent::Key(Key::Char('q')));
            }
            self.poll();
        }
    }

    /// Block until any key is pressed, ignoring the pointer.
    pub fn wait_for_key(&mut self) -> Result<Key> {
        loop {
            match self.next_event()? {
                InputEvent::Key(key) => return Ok(key),
                _ => continue,
            }
        }
    }
}

/// Show `image` in its own window until a key is pressed.
pub fn show_until_key(title: &str, image: &RgbImage) -> Result<Key> {
    let mut window = PhotoWindow::open(title, image.width(), image.height())?;
    window.show(image)?;
    window.wait_for_key()
}

/// Coarse correction on the working image.
pub struct CoarseView<'a> {
    window: PhotoWindow,
    working: &'a RgbImage,
}

impl<'a> CoarseView<'a> {
    pub fn open(title: &str, working: &'a RgbImage) -> Result<Self> {
        Ok(Self {
            window: PhotoWindow::open(title, working.width(), working.height())?,
            working,
        })
    }
}

impl CorrectionSurface<CoarseSession> for CoarseView<'_> {
    type Error = MediaError;

    fn present(&mut self, state: &CoarseSession) -> Result<()> {
        self.window.show(&overlay::coarse_frame(self.working, state))
    }

    fn next_event(&mut self) -> Result<InputEvent> {
        self.window.next_event()
    }
}

/// Fine correction of one eye on the native image.
pub struct FineView<'a> {
    window: PhotoWindow,
    native: &'a RgbImage,
}

impl<'a> FineView<'a> {
    pub fn open(title: &str, native: &'a RgbImage, zoom_size: u32) -> Result<Self> {
        Ok(Self {
            window: PhotoWindow::open(title, zoom_size, zoom_size)?,
            native,
        })
    }
}

impl<'s> CorrectionSurface<FineSession<'s>> for FineView<'_> {
    type Error = MediaError;

    fn present(&mut self, state: &FineSession<'s>) -> Result<()> {
        self.window.show(&overlay::fine_frame(self.native, state))
    }

    fn next_event(&mut self) -> Result<InputEvent> {
        self.window.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(q: &mut VecDeque<InputEvent>) -> Vec<InputEvent> {
        q.drain(..).collect()
    }

    #[test]
    fn test_key_translation() {
        assert_eq!(translate_key(minifb::Key::Tab), Some(Key::Tab));
        assert_eq!(translate_key(minifb::Key::Q), Some(Key::Char('q')));
        assert_eq!(translate_key(minifb::Key::Equal), Some(Key::Char('+')));
        assert_eq!(translate_key(minifb::Key::NumPadMinus), Some(Key::Char('-')));
        assert_eq!(translate_key(minifb::Key::F1), None);
    }

    #[test]
    fn test_press_drag_release() {
        let mut tracker = PointerTracker::default();
        let mut q = VecDeque::new();

        tracker.sample(Some((10, 10)), [false, false], &mut q);
        assert!(q.is_empty());

        tracker.sample(Some((10, 10)), [true, false], &mut q);
        assert_eq!(
            drain(&mut q),
            vec![InputEvent::PointerDown { button: Button::Primary, x: 10, y: 10 }]
        );

        tracker.sample(Some((14, 12)), [true, false], &mut q);
        assert_eq!(drain(&mut q), vec![InputEvent::PointerMove { x: 14, y: 12 }]);

        tracker.sample(Some((14, 12)), [false, false], &mut q);
        assert_eq!(
            drain(&mut q),
            vec![InputEvent::PointerUp { button: Button::Primary, x: 14, y: 12 }]
        );
    }

    #[test]
    fn test_hover_without_button_is_silent() {
        let mut tracker = PointerTracker::default();
        let mut q = VecDeque::new();
        tracker.sample(Some((1, 1)), [false, false], &mut q);
        tracker.sample(Some((5, 9)), [false, false], &mut q);
        assert!(q.is_empty());
    }

    #[test]
    fn test_secondary_button() {
        let mut tracker = PointerTracker::default();
        let mut q = VecDeque::new();
        tracker.sample(Some((3, 4)), [false, true], &mut q);
        assert_eq!(
            drain(&mut q),
            vec![InputEvent::PointerDown { button: Button::Secondary, x: 3, y: 4 }]
        );
    }
}
