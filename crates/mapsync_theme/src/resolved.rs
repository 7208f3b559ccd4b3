//! Resolved theme binding

use mapsync_core::reactive::{Observable, Subscription};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Light or dark rendering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

/// Where theme hints come from
pub trait ThemeEnvironment {
    /// Scheme forced by the host document (a `dark`/`light` class), if any
    fn document(&self) -> Observable<Option<ColorScheme>>;

    /// The operating system preference
    fn system(&self) -> Observable<ColorScheme>;
}

/// Environment backed by plain observables, driven by the host
#[derive(Clone, Debug)]
pub struct ObservableEnvironment {
    pub document: Observable<Option<ColorScheme>>,
    pub system: Observable<ColorScheme>,
}

impl ObservableEnvironment {
    pub fn new(document: Option<ColorScheme>, system: ColorScheme) -> Self {
        Self {
            document: Observable::new(document),
            system: Observable::new(system),
        }
    }
}

impl Default for ObservableEnvironment {
    fn default() -> Self {
        Self::new(None, ColorScheme::Light)
    }
}

impl ThemeEnvironment for ObservableEnvironment {
    fn document(&self) -> Observable<Option<ColorScheme>> {
        self.document.clone()
    }

    fn system(&self) -> Observable<ColorScheme> {
        self.system.clone()
    }
}

/// The scheme a map renders with: `explicit ?? detected`
///
/// `detected` starts as `document ?? system`. While mounted without an explicit
/// scheme it follows document changes, and system changes only while the
/// document sets no scheme.
pub struct ResolvedTheme {
    env: Rc<dyn ThemeEnvironment>,
    explicit: Observable<Option<ColorScheme>>,
    detected: Observable<ColorScheme>,
    resolved: Observable<ColorScheme>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl ResolvedTheme {
    pub fn new(env: Rc<dyn ThemeEnvironment>, explicit: Option<ColorScheme>) -> Self {
        let detected = env.document().get().unwrap_or_else(|| env.system().get());
        let resolved = explicit.unwrap_or(detected);
        Self {
            env,
            explicit: Observable::new(explicit),
            detected: Observable::new(detected),
            resolved: Observable::new(resolved),
            subscriptions: RefCell::new(Vec::new()),
        }
    }

    pub fn get(&self) -> ColorScheme {
        self.resolved.get()
    }

    /// Observe the resolved scheme
    pub fn observe(&self) -> &Observable<ColorScheme> {
        &self.resolved
    }

    /// Force a scheme, or go back to detection with `None`
    pub fn set_explicit(&self, scheme: Option<ColorScheme>) {
        self.explicit.set(scheme);
        refresh(&self.explicit, &self.detected, &self.resolved);
    }

    /// Start following the environment, unless a scheme is forced
    pub fn mount(&self) {
        if self.explicit.get().is_some() {
            return;
        }
        let mut subscriptions = self.subscriptions.borrow_mut();
        if !subscriptions.is_empty() {
            return;
        }

        let (explicit, detected, resolved) = self.cells();
        subscriptions.push(self.env.document().subscribe(move |document| {
            if let Some(scheme) = *document {
                detected.set(scheme);
                refresh(&explicit, &detected, &resolved);
            }
        }));

        let (explicit, detected, resolved) = self.cells();
        let document = self.env.document();
        subscriptions.push(self.env.system().subscribe(move |system| {
            if document.get().is_none() {
                detected.set(*system);
                refresh(&explicit, &detected, &resolved);
            }
        }));
        tracing::trace!("theme: following environment");
    }

    /// Stop following the environment
    pub fn unmount(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
    }

    pub fn is_mounted(&self) -> bool {
        !self.subscriptions.borrow().is_empty()
    }

    fn cells(
        &self,
    ) -> (
        Observable<Option<ColorScheme>>,
        Observable<ColorScheme>,
        Observable<ColorScheme>,
    ) {
        (self.explicit.clone(), self.detected.clone(), self.resolved.clone())
    }
}

fn refresh(
    explicit: &Observable<Option<ColorScheme>>,
    detected: &Observable<ColorScheme>,
    resolved: &Observable<ColorScheme>,
) {
    resolved.set(explicit.get().unwrap_or_else(|| detected.get()));
}

impl fmt::Debug for ResolvedTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTheme")
            .field("explicit", &self.explicit.get())
            .field("detected", &self.detected.get())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
