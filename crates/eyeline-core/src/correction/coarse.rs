use super::{Button, Correction, EyeList, InputEvent, Key, Relocation, Step};
use crate::types::{ImageSize, Point};

const INITIAL_SPEED: i32 = 1;
const SPEED_STEP: i32 = 10;
const SPEED_WRAP: i32 = 30;
/// Where a first eye is created on an empty image, relative to its size.
const NEW_EYE_X_OFFSET: f64 = 0.1;
const NEW_EYE_Y: f64 = 0.35;

/// Whole-image correction of zero to two eye points on the working image.
#[derive(Debug, Clone)]
pub struct CoarseSession {
    eyes: EyeList,
    selected: Option<usize>,
    /// Point under a held pointer button, tracked by identity across re-sorts.
    drag: Option<(Button, usize)>,
    speed: i32,
    size: ImageSize,
}

impl CoarseSession {
    /// Start from detected points.
    ///
    /// Detection may seed more than two points. The list then holds more than
    /// two eyes until the operator deletes the extras: pointer placement,
    /// creation and commit are refused while it does, and only selection,
    /// nudging and deletion are accepted.
    pub fn new(size: ImageSize, detected: impl IntoIterator<Item = Point>) -> Self {
        Self {
            eyes: EyeList::new(detected),
            selected: None,
            drag: None,
            speed: INITIAL_SPEED,
            size,
        }
    }

    pub fn eyes(&self) -> &EyeList {
        &self.eyes
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The committed points, sorted by x.
    pub fn into_points(self) -> Vec<Point> {
        self.eyes.points().to_vec()
    }

    fn apply(&mut self, moved: &Relocation) {
        self.selected = self.selected.and_then(|i| moved.follow(i));
        self.drag = self.drag.and_then(|(b, i)| moved.follow(i).map(|i| (b, i)));
    }

    fn press(&mut self, button: Button, at: Point) -> Step {
        if self.eyes.len() > 2 {
            tracing::warn!(eyes = self.eyes.len(), "more than two eyes; delete some before using the pointer");
            return Step::Rejected;
        }

        let moved = match (button, self.eyes.len()) {
            (_, 0) => self.eyes.insert(0, at),
            (Button::Primary, _) => self.eyes.set(0, at),
            (Button::Secondary, 1) => self.eyes.insert(1, at),
            (Button::Secondary, _) => self.eyes.set(1, at),
        };
        self.apply(&moved);

        let placed = moved.placed();
        self.selected = placed;
        self.drag = placed.map(|i| (button, i));
        Step::Continue
    }

    fn drag_to(&mut self, at: Point) -> Step {
        let Some((_, index)) = self.drag else {
            return Step::Continue;
        };
        let moved = self.eyes.set(index, at);
        self.apply(&moved);
        Step::Continue
    }

    fn release(&mut self, button: Button) -> Step {
        if matches!(self.drag, Some((held, _)) if held == button) {
            self.drag = None;
        }
        Step::Continue
    }

    fn nudge(&mut self, dx: i32, dy: i32) -> Step {
        let Some(index) = self.selected else {
            return Step::Rejected;
        };
        let Some(p) = self.eyes.get(index) else {
            return Step::Rejected;
        };
        let moved = self.eyes.set(index, Point::new(p.x + dx * self.speed, p.y + dy * self.speed));
        self.apply(&moved);
        Step::Continue
    }

    fn cycle_selection(&mut self) -> Step {
        let len = self.eyes.len();
        self.selected = match self.selected {
            _ if len == 0 => None,
            None => Some(0),
            Some(i) if (i + 1) % len == 0 => None,
            Some(i) => Some(i + 1),
        };
        tracing::debug!(selected = ?self.selected, "selection changed");
        Step::Continue
    }

    fn create(&mut self) -> Step {
        let (w, h) = (self.size.width as i32, self.size.height as i32);
        let (index, point) = match self.eyes.points() {
            [] => (
                0,
                Point::new(
                    (w as f64 / 2.0 - NEW_EYE_X_OFFSET * w as f64) as i32,
                    (h as f64 * NEW_EYE_Y) as i32,
                ),
            ),
            [existing] => {
                let index = if existing.x < w / 2 { 1 } else { 0 };
                (index, Point::new(w - existing.x, existing.y))
            }
            _ => return Step::Rejected,
        };

        let moved = self.eyes.insert(index, point);
        self.apply(&moved);
        self.selected = moved.placed();
        Step::Continue
    }

    fn delete(&mut self) -> Step {
        let Some(index) = self.selected else {
            return Step::Rejected;
        };
        if self.eyes.remove(index).is_none() {
            return Step::Rejected;
        }
        self.selected = None;
        self.drag = None;
        Step::Continue
    }

    fn commit(&self) -> Step {
        if self.eyes.len() == 2 {
            Step::Done
        } else {
            tracing::info!(eyes = self.eyes.len(), "exactly two eyes are needed to continue");
            Step::Rejected
        }
    }
}

impl Correction for CoarseSession {
    fn step(&mut self, event: &InputEvent) -> Step {
        match *event {
            InputEvent::PointerDown { button, x, y } => self.press(button, Point::new(x, y)),
            InputEvent::PointerMove { x, y } => self.drag_to(Point::new(x, y)),
            InputEvent::PointerUp { button, .. } => self.release(button),
            InputEvent::Key(key) => match key {
                Key::Up => self.nudge(0, -1),
                Key::Down => self.nudge(0, 1),
                Key::Left => self.nudge(-1, 0),
                Key::Right => self.nudge(1, 0),
                Key::Tab => self.cycle_selection(),
                Key::Escape => {
                    self.selected = None;
                    Step::Continue
                }
                Key::Space | Key::Char('n') => self.commit(),
                Key::Char('c') => self.create(),
                Key::Char('d') | Key::Char('x') => self.delete(),
                Key::Char('f') => {
                    self.speed = (self.speed + SPEED_STEP) % SPEED_WRAP;
                    Step::Continue
                }
                Key::Char('q') => Step::Cancelled,
                Key::Char(_) => Step::Rejected,
            },
        }
    }
}
