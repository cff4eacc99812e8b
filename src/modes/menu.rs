use std::time::{Duration, Instant};

use serde::Serialize;

use super::{Cooldown, FrameInput, HoldTimer, Mode};
use crate::types::GestureLabel;

pub const OPEN_HOLD: Duration = Duration::from_millis(600);
pub const CLOSE_HOLD: Duration = Duration::from_millis(300);
pub const CONFIRM_HOLD: Duration = Duration::from_millis(250);
pub const MENU_TIMEOUT: Duration = Duration::from_secs(5);
pub const OPEN_COOLDOWN: Duration = Duration::from_secs(1);
pub const NAV_COOLDOWN: Duration = Duration::from_millis(220);

/// Menu transitions reported to the HUD.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MenuEvent {
    Opened(Mode),
    Moved(Mode),
    Confirmed(Mode),
    Closed,
}

#[derive(Debug)]
struct OpenMenu {
    selected: usize,
    deadline: Instant,
    /// Both fists must drop once after opening before they can close the menu.
    fists_released: bool,
    next_armed: bool,
    prev_armed: bool,
}

/// Both-fist mode picker. While open it owns all gesture input.
#[derive(Debug, Default)]
pub struct ModeMenu {
    open: Option<OpenMenu>,
    open_hold: HoldTimer,
    close_hold: HoldTimer,
    confirm_hold: HoldTimer,
    open_cooldown: Cooldown,
    nav_cooldown: Cooldown,
}

impl ModeMenu {
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn selected(&self) -> Option<Mode> {
        self.open.as_ref().map(|m| Mode::ALL[m.selected])
    }

    /// Whether both hands are closing in on the open gesture; other machines stand down meanwhile.
    pub fn arming(&self) -> bool {
        self.open.is_none() && self.open_hold.started().is_some()
    }

    pub fn update(&mut self, now: Instant, current: Mode, input: &FrameInput) -> Option<MenuEvent> {
        let both_fist = input.both(GestureLabel::Fist);
        let Some(menu) = self.open.as_mut() else {
            if self.open_hold.reached(now, both_fist, OPEN_HOLD) && self.open_cooldown.ready(now) {
                self.open_hold.reset();
                self.open_cooldown.trigger(now, OPEN_COOLDOWN);
                self.nav_cooldown.clear();
                self.open = Some(OpenMenu {
                    selected: current.index(),
                    deadline: now + MENU_TIMEOUT,
                    fists_released: false,
                    next_armed: true,
                    prev_armed: true,
                });
                log::info!("mode menu opened on {current}");
                return Some(MenuEvent::Opened(current));
            }
            return None;
        };

        if now >= menu.deadline {
            return Some(self.close());
        }

        if !both_fist {
            menu.fists_released = true;
        }
        if self.close_hold.reached(now, both_fist && menu.fists_released, CLOSE_HOLD) {
            return Some(self.close());
        }

        if self
            .confirm_hold
            .reached(now, input.both(GestureLabel::OpenPalm), CONFIRM_HOLD)
        {
            let mode = Mode::ALL[menu.selected];
            self.close();
            log::info!("mode menu confirmed {mode}");
            return Some(MenuEvent::Confirmed(mode));
        }

        let label = input.primary_label();
        if label != GestureLabel::PinchIndex {
            menu.next_armed = true;
        }
        if label != GestureLabel::VSign {
            menu.prev_armed = true;
        }
        let step = match label {
            GestureLabel::PinchIndex if menu.next_armed => 1,
            GestureLabel::VSign if menu.prev_armed => Mode::ALL.len() - 1,
            _ => return None,
        };
        if !self.nav_cooldown.ready(now) {
            return None;
        }
        self.nav_cooldown.trigger(now, NAV_COOLDOWN);
        if step == 1 {
            menu.next_armed = false;
        } else {
            menu.prev_armed = false;
        }
        menu.selected = (menu.selected + step) % Mode::ALL.len();
        menu.deadline = now + MENU_TIMEOUT;
        Some(MenuEvent::Moved(Mode::ALL[menu.selected]))
    }

    fn close(&mut self) -> MenuEvent {
        self.open = None;
        self.close_hold.reset();
        self.confirm_hold.reset();
        MenuEvent::Closed
    }

    /// Force-closes the menu, reporting `Closed` if it was open.
    pub fn reset(&mut self) -> Option<MenuEvent> {
        self.open_hold.reset();
        self.is_open().then(|| self.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::testing::*;
    use GestureLabel::{Fist, OpenPalm, PinchIndex, VSign};

    fn drive(menu: &mut ModeMenu, t0: Instant, from: u64, to: u64, input: &FrameInput) -> Vec<(u64, MenuEvent)> {
        let mut out = Vec::new();
        let mut t = from;
        while t < to {
            if let Some(event) = menu.update(ms(t0, t), Mode::Mouse, input) {
                out.push((t, event));
            }
            t += 33;
        }
        out
    }

    fn opened(t0: Instant) -> ModeMenu {
        let mut menu = ModeMenu::default();
        let events = drive(&mut menu, t0, 0, 700, &two(Fist, Fist));
        assert_eq!(events, vec![(627, MenuEvent::Opened(Mode::Mouse))]);
        menu
    }

    #[test]
    fn both_fists_open_after_hold() {
        let t0 = Instant::now();
        let menu = opened(t0);
        assert!(menu.is_open());
        assert_eq!(menu.selected(), Some(Mode::Mouse));
    }

    #[test]
    fn held_fists_do_not_immediately_close() {
        let t0 = Instant::now();
        let mut menu = opened(t0);
        assert!(drive(&mut menu, t0, 700, 2000, &two(Fist, Fist)).is_empty());
        drive(&mut menu, t0, 2000, 2100, &two(OpenPalm, Fist));
        let events = drive(&mut menu, t0, 2100, 2500, &two(Fist, Fist));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, MenuEvent::Closed);
    }

    #[test]
    fn navigation_is_edge_triggered_and_wraps() {
        let t0 = Instant::now();
        let mut menu = opened(t0);
        let mut events = drive(&mut menu, t0, 700, 1200, &one(PinchIndex));
        assert_eq!(events, vec![(700, MenuEvent::Moved(Mode::Keyboard))]);
        events = drive(&mut menu, t0, 1200, 1300, &one(OpenPalm));
        events.extend(drive(&mut menu, t0, 1300, 1400, &one(VSign)));
        events.extend(drive(&mut menu, t0, 1400, 1500, &one(OpenPalm)));
        events.extend(drive(&mut menu, t0, 1500, 1600, &one(VSign)));
        assert_eq!(
            events.iter().map(|(_, e)| *e).collect::<Vec<_>>(),
            vec![MenuEvent::Moved(Mode::Mouse), MenuEvent::Moved(Mode::Vkey)]
        );
    }

    #[test]
    fn both_palms_confirm_selection() {
        let t0 = Instant::now();
        let mut menu = opened(t0);
        drive(&mut menu, t0, 700, 750, &one(PinchIndex));
        let events = drive(&mut menu, t0, 750, 1200, &two(OpenPalm, OpenPalm));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, MenuEvent::Confirmed(Mode::Keyboard));
        assert!(!menu.is_open());
    }

    #[test]
    fn inactivity_closes_and_navigation_renews() {
        let t0 = Instant::now();
        let mut menu = opened(t0);
        drive(&mut menu, t0, 700, 800, &one(OpenPalm));
        // Navigation at 5000 ms renews the deadline past the first one at 5627 ms.
        drive(&mut menu, t0, 5000, 5050, &one(PinchIndex));
        assert!(drive(&mut menu, t0, 5050, 9900, &one(OpenPalm)).is_empty());
        let events = drive(&mut menu, t0, 9900, 10200, &one(OpenPalm));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, MenuEvent::Closed);
    }

    #[test]
    fn reopen_waits_for_cooldown() {
        let t0 = Instant::now();
        let mut menu = opened(t0);
        assert_eq!(menu.reset(), Some(MenuEvent::Closed));
        let events = drive(&mut menu, t0, 700, 1500, &two(Fist, Fist));
        assert!(events.is_empty());
        let events = drive(&mut menu, t0, 1500, 2000, &two(Fist, Fist));
        assert_eq!(events.len(), 1);
    }
}
