//! # Layers
//!
//! A layer is a named group of systems sharing one write-authority scope.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name of a layer. Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Layer(Arc<str>);

impl Layer {
    /// Creates a layer from its name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the layer name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer({:?})", &*self.0)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Layer {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Layer {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&Layer> for Layer {
    fn from(layer: &Layer) -> Self {
        layer.clone()
    }
}

impl Borrow<str> for Layer {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_equality_by_name() {
        let a = Layer::new("movement");
        let b: Layer = String::from("movement").into();
        assert_eq!(a, b);
        assert_ne!(a, Layer::from("physics"));
        assert_eq!(a.to_string(), "movement");
    }
}
