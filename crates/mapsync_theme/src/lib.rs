//! mapsync theme
//!
//! Resolves the color scheme a map should render with. An explicit scheme always
//! wins; otherwise the scheme is detected from the host document, falling back to
//! the system preference.
//!
//! ```
//! use mapsync_theme::{ColorScheme, ObservableEnvironment, ResolvedTheme};
//! use std::rc::Rc;
//!
//! let env = Rc::new(ObservableEnvironment::new(None, ColorScheme::Light));
//! let theme = ResolvedTheme::new(env.clone(), None);
//! theme.mount();
//!
//! env.system.set(ColorScheme::Dark);
//! assert_eq!(theme.get(), ColorScheme::Dark);
//! ```

pub mod resolved;

pub use resolved::{ColorScheme, ObservableEnvironment, ResolvedTheme, ThemeEnvironment};
