/// ContextBinding - the slice of element lifecycle this subsystem
/// touches: finding/keeping the local GL context and arbitrating
/// share-context offers from the surrounding pipeline.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::gl::{GlContext, GlDevice};
use crate::{prism_debug, prism_warn};

#[derive(Default)]
struct BindingState {
    local: Option<Arc<GlContext>>,
    shared: Option<Arc<GlContext>>,
}

/// Holds an element's local GL context and the foreign context offered
/// for sharing, if any.
#[derive(Default)]
pub struct ContextBinding {
    state: Mutex<BindingState>,
}

impl ContextBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a context offered by the surrounding pipeline for sharing.
    ///
    /// When several distinct contexts race to be the share source, the
    /// first offer wins; later ones are logged and ignored.
    pub fn offer_shared_context(&self, context: Arc<GlContext>) {
        let mut st = self.state.lock().expect("context binding poisoned");
        match &st.shared {
            None => {
                prism_debug!("prismgl::pipeline", "got shared context {:?}", context);
                st.shared = Some(context);
            }
            Some(existing) if Arc::ptr_eq(existing, &context) => {}
            Some(_) => {
                prism_warn!(
                    "prismgl::pipeline",
                    "cannot share with more than one GL context; keeping the first"
                );
            }
        }
    }

    /// The context offered for sharing, if any
    pub fn shared_context(&self) -> Option<Arc<GlContext>> {
        self.state.lock().expect("context binding poisoned").shared.clone()
    }

    /// The local context, if one has been established
    pub fn context(&self) -> Option<Arc<GlContext>> {
        self.state.lock().expect("context binding poisoned").local.clone()
    }

    /// Return the local context, creating it through `factory` on first
    /// use. The factory receives the shared context (if any) so the new
    /// context can share resources with it.
    pub fn ensure_context<F>(&self, factory: F) -> Result<Arc<GlContext>>
    where
        F: FnOnce(Option<Arc<GlContext>>) -> Result<Arc<GlContext>>,
    {
        let mut st = self.state.lock().expect("context binding poisoned");
        if let Some(context) = &st.local {
            return Ok(context.clone());
        }
        let context = factory(st.shared.clone())?;
        st.local = Some(context.clone());
        Ok(context)
    }

    /// Run a startup hook on the context thread (element `gl_start`)
    pub fn start_gl<F>(&self, hook: F) -> Result<()>
    where
        F: FnOnce(&mut dyn GlDevice) -> Result<()> + Send + 'static,
    {
        let context = self.context().ok_or_else(|| {
            Error::InitializationFailed("no GL context established".to_string())
        })?;
        context.dispatch(hook)
    }

    /// Run a teardown hook on the context thread and drop both context
    /// references (element `gl_stop` + reset)
    pub fn reset<F>(&self, stop_hook: Option<F>)
    where
        F: FnOnce(&mut dyn GlDevice) + Send + 'static,
    {
        let local = {
            let st = self.state.lock().expect("context binding poisoned");
            st.local.clone()
        };
        if let (Some(context), Some(hook)) = (local, stop_hook) {
            context.dispatch(hook);
        }
        let mut st = self.state.lock().expect("context binding poisoned");
        st.local = None;
        st.shared = None;
    }
}
