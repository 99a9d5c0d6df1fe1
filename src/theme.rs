//! Light/dark colour themes, passed explicitly to whoever draws

pub type Rgba = [f32; 4];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub window_background: Rgba,
    pub background: Rgba,
    pub foreground: Rgba,
    pub button_background: Rgba,
    pub button_pressed: Rgba,
    pub button_text: Rgba,
    pub label_text: Rgba,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn from_dark_mode(dark: bool) -> Self {
        if dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Theme::Light => Palette {
                window_background: [0.8, 0.8, 0.8, 1.0],
                background: [0.6, 0.6, 0.6, 1.0],
                foreground: [0.87, 0.87, 0.87, 1.0],
                button_background: [0.2, 0.2, 0.2, 1.0],
                button_pressed: [0.0, 0.27, 0.4, 1.0],
                button_text: [0.0, 1.0, 1.0, 1.0],
                label_text: [0.87, 0.87, 1.0, 1.0],
            },
            Theme::Dark => Palette {
                window_background: [0.1, 0.1, 0.1, 1.0],
                background: [0.3, 0.3, 0.3, 1.0],
                foreground: [0.13, 0.13, 0.13, 1.0],
                button_background: [0.93, 0.93, 0.93, 1.0],
                button_pressed: [0.8, 0.8, 0.8, 1.0],
                button_text: [0.0, 0.27, 0.4, 1.0],
                label_text: [0.73, 0.73, 0.95, 1.0],
            },
        }
    }
}
