use super::{Button, Correction, InputEvent, Key, Step};
use crate::types::{ImageSize, Point, Rect};

/// Number of crosshair variants the display cycles through.
pub const CROSSHAIR_STYLES: u8 = 16;

const MIN_EYE_SIZE: u32 = 20;
const EYE_SIZE_FRACTION: f64 = 0.10;
const EYE_SIZE_STEP: u32 = 5;
const SMALLEST_EYE_SIZE: u32 = 5;
const GROW_MARGIN: i32 = 5;
const INITIAL_SPEED: i32 = 1;
const SPEED_STEP: i32 = 5;
const SPEED_WRAP: i32 = 10;

/// Zoom window settings shared by every fine session of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineSettings {
    /// Side of the native-resolution crop around the eye.
    pub eye_size: u32,
    /// Index into the crosshair table, `0..CROSSHAIR_STYLES`.
    pub crosshair_style: u8,
    /// Side of the magnified window.
    pub zoom_size: u32,
}

impl FineSettings {
    /// Settings derived from the first photo of a run.
    pub fn for_image(size: ImageSize, zoom_size: u32) -> Self {
        let eye_size = (EYE_SIZE_FRACTION * size.max_dimension() as f64) as u32;
        Self {
            eye_size: eye_size.max(MIN_EYE_SIZE),
            crosshair_style: 0,
            zoom_size,
        }
    }

    fn half(&self) -> i32 {
        (self.eye_size as f64 / 2.0) as i32
    }
}

/// Pixel-precise correction of one eye in a zoomed crop of the native image.
#[derive(Debug)]
pub struct FineSession<'a> {
    settings: &'a mut FineSettings,
    eye_index: usize,
    point: Point,
    speed: i32,
    size: ImageSize,
}

impl<'a> FineSession<'a> {
    pub fn new(settings: &'a mut FineSettings, size: ImageSize, eye_index: usize, point: Point) -> Self {
        Self {
            settings,
            eye_index,
            point,
            speed: INITIAL_SPEED,
            size,
        }
    }

    pub fn point(&self) -> Point {
        self.point
    }

    pub fn eye_index(&self) -> usize {
        self.eye_index
    }

    pub fn settings(&self) -> &FineSettings {
        self.settings
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Native-space crop shown in the zoom window. May extend past the image.
    pub fn crop(&self) -> Rect {
        let side = self.settings.eye_size as i32;
        let corner = |c: i32| (c as f64 - self.settings.eye_size as f64 / 2.0) as i32;
        Rect::new(corner(self.point.x), corner(self.point.y), side, side)
    }

    fn click(&mut self, zx: i32, zy: i32) -> Step {
        let eye = self.settings.eye_size as f64;
        let zoom = self.settings.zoom_size.max(1) as f64;
        let local = |z: i32| (z as f64 / zoom * eye) as i32;
        let recenter = |l: i32, c: i32| (l as f64 + c as f64 - eye / 2.0) as i32;

        self.point = Point::new(
            recenter(local(zx), self.point.x),
            recenter(local(zy), self.point.y),
        );
        Step::Continue
    }

    fn nudge(&mut self, dx: i32, dy: i32) -> Step {
        let half = self.settings.half();
        let (w, h) = (self.size.width as i32, self.size.height as i32);
        let s = self.speed;
        let Point { x, y } = self.point;

        let fits = match (dx, dy) {
            (0, -1) => y - half >= s,
            (0, 1) => y + half <= h - s,
            (-1, 0) => x - half >= s,
            (1, 0) => x + half <= w - s,
            _ => false,
        };
        if !fits {
            return Step::Rejected;
        }
        self.point = Point::new(x + dx * s, y + dy * s);
        Step::Continue
    }

    fn shrink(&mut self) -> Step {
        if self.settings.eye_size <= SMALLEST_EYE_SIZE {
            return Step::Rejected;
        }
        self.settings.eye_size = (self.settings.eye_size - EYE_SIZE_STEP).max(SMALLEST_EYE_SIZE);
        Step::Continue
    }

    fn grow(&mut self) -> Step {
        let grown = self.settings.eye_size + EYE_SIZE_STEP;
        let half = (grown as f64 / 2.0) as i32;
        let (w, h) = (self.size.width as i32, self.size.height as i32);
        let Point { x, y } = self.point;

        let fits = x - half > GROW_MARGIN
            && x + half < w - GROW_MARGIN
            && y - half > GROW_MARGIN
            && y + half < h - GROW_MARGIN;
        if !fits {
            return Step::Rejected;
        }
        self.settings.eye_size = grown;
        Step::Continue
    }
}

impl Correction for FineSession<'_> {
    fn step(&mut self, event: &InputEvent) -> Step {
        match *event {
            InputEvent::PointerUp { button: Button::Primary, x, y } => self.click(x, y),
            InputEvent::PointerDown { .. } | InputEvent::PointerMove { .. } | InputEvent::PointerUp { .. } => {
                Step::Continue
            }
            InputEvent::Key(key) => match key {
                Key::Up => self.nudge(0, -1),
                Key::Down => self.nudge(0, 1),
                Key::Left => self.nudge(-1, 0),
                Key::Right => self.nudge(1, 0),
                Key::Space | Key::Tab | Key::Char('n') => Step::Done,
                Key::Char('q') => Step::Cancelled,
                Key::Char('f') => {
                    self.speed = (self.speed + SPEED_STEP) % SPEED_WRAP;
                    Step::Continue
                }
                Key::Char('s') => {
                    self.settings.crosshair_style = (self.settings.crosshair_style + 1) % CROSSHAIR_STYLES;
                    Step::Continue
                }
                Key::Char('+') => self.shrink(),
                Key::Char('-') => self.grow(),
                Key::Escape | Key::Char(_) => Step::Rejected,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(eye_size: u32) -> FineSettings {
        FineSettings {
            eye_size,
            crosshair_style: 0,
            zoom_size: 640,
        }
    }

    fn key(c: char) -> InputEvent {
        InputEvent::Key(Key::Char(c))
    }

    fn release(x: i32, y: i32) -> InputEvent {
        InputEvent::PointerUp { button: Button::Primary, x, y }
    }

    #[test]
    fn test_settings_from_first_image() {
        assert_eq!(FineSettings::for_image(ImageSize::new(4000, 3000), 640).eye_size, 400);
        assert_eq!(FineSettings::for_image(ImageSize::new(150, 100), 640).eye_size, 20);
    }

    #[test]
    fn test_click_selects_absolute_position() {
        let mut s = settings(100);
        let mut session = FineSession::new(&mut s, ImageSize::new(1000, 1000), 0, Point::new(500, 500));

        session.step(&release(320, 320));
        assert_eq!(session.point(), Point::new(500, 500));

        session.step(&release(0, 0));
        assert_eq!(session.point(), Point::new(450, 450));

        session.step(&release(640, 64));
        assert_eq!(session.point(), Point::new(500, 410));
    }

    #[test]
    fn test_only_primary_release_moves() {
        let mut s = settings(100);
        let mut session = FineSession::new(&mut s, ImageSize::new(1000, 1000), 1, Point::new(500, 500));
        session.step(&InputEvent::PointerDown { button: Button::Primary, x: 0, y: 0 });
        session.step(&InputEvent::PointerMove { x: 0, y: 0 });
        session.step(&InputEvent::PointerUp { button: Button::Secondary, x: 0, y: 0 });
        assert_eq!(session.point(), Point::new(500, 500));
    }

    #[test]
    fn test_nudge_keeps_crop_inside_image() {
        let mut s = settings(20);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(10, 100));
        assert_eq!(session.step(&InputEvent::Key(Key::Left)), Step::Rejected);
        assert_eq!(session.point(), Point::new(10, 100));

        assert_eq!(session.step(&InputEvent::Key(Key::Right)), Step::Continue);
        assert_eq!(session.point(), Point::new(11, 100));
    }

    #[test]
    fn test_nudge_bottom_edge() {
        let mut s = settings(20);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(100, 189));
        assert_eq!(session.step(&InputEvent::Key(Key::Down)), Step::Continue);
        assert_eq!(session.point(), Point::new(100, 190));
        assert_eq!(session.step(&InputEvent::Key(Key::Down)), Step::Rejected);
    }

    #[test]
    fn test_speed_cycles_one_and_six() {
        let mut s = settings(20);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(100, 100));
        let mut speeds = vec![session.speed()];
        for _ in 0..2 {
            session.step(&key('f'));
            speeds.push(session.speed());
        }
        assert_eq!(speeds, vec![1, 6, 1]);
    }

    #[test]
    fn test_style_is_shared_between_sessions() {
        let mut s = settings(20);
        s.crosshair_style = CROSSHAIR_STYLES - 1;
        {
            let mut first = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(100, 100));
            first.step(&key('s'));
            first.step(&key('s'));
            assert_eq!(first.settings().crosshair_style, 1);
            first.step(&key('+'));
        }
        let second = FineSession::new(&mut s, ImageSize::new(200, 200), 1, Point::new(50, 50));
        assert_eq!(second.settings().crosshair_style, 1);
        assert_eq!(second.settings().eye_size, 15);
    }

    #[test]
    fn test_shrink_floors_at_five() {
        let mut s = settings(8);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(100, 100));
        assert_eq!(session.step(&key('+')), Step::Continue);
        assert_eq!(session.settings().eye_size, 5);
        assert_eq!(session.step(&key('+')), Step::Rejected);
        assert_eq!(session.settings().eye_size, 5);
    }

    #[test]
    fn test_grow_needs_margin() {
        let mut s = settings(20);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(20, 100));
        assert_eq!(session.step(&key('-')), Step::Continue);
        assert_eq!(session.settings().eye_size, 25);

        let mut s = settings(20);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(16, 100));
        assert_eq!(session.step(&key('-')), Step::Rejected);
        assert_eq!(session.settings().eye_size, 20);
    }

    #[test]
    fn test_commit_and_quit_keys() {
        let mut s = settings(20);
        let mut session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(100, 100));
        assert_eq!(session.step(&InputEvent::Key(Key::Tab)), Step::Done);
        assert_eq!(session.step(&InputEvent::Key(Key::Space)), Step::Done);
        assert_eq!(session.step(&key('n')), Step::Done);
        assert_eq!(session.step(&key('q')), Step::Cancelled);
        assert_eq!(session.step(&InputEvent::Key(Key::Escape)), Step::Rejected);
    }

    #[test]
    fn test_crop_centers_on_point() {
        let mut s = settings(21);
        let session = FineSession::new(&mut s, ImageSize::new(200, 200), 0, Point::new(100, 50));
        assert_eq!(session.crop(), Rect::new(89, 39, 21, 21));
    }
}
