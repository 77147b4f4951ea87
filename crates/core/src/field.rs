//! Grid data structures shared by every pipeline stage
//!
//! Fields are stored as flat `Vec<f32>` in row-major order (`row * width + col`),
//! the same layout the solver grids use. A [`FieldSequence`] is the conditioning
//! window (oldest first) and a [`MotionField`] holds the advection vectors in
//! pixels per timestep.

use crate::error::{NowcastError, Result};

/// A 2-D scalar grid
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Values in row-major order (row * width + col)
    pub data: Vec<f32>,
    /// Grid width in cells (columns)
    pub width: usize,
    /// Grid height in cells (rows)
    pub height: usize,
}

impl Field {
    /// Create a new field with given dimensions, initialized to zero
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_value(width, height, 0.0)
    }

    /// Create a new field with given dimensions, initialized to a value
    #[must_use]
    pub fn with_value(width: usize, height: usize, value: f32) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Wrap an existing buffer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the buffer length does not match
    /// `width * height` or either dimension is zero.
    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(NowcastError::config(format!(
                "field dimensions must be positive, got {width}x{height}"
            )));
        }
        if data.len() != width * height {
            return Err(NowcastError::config(format!(
                "field buffer has {} values, expected {}x{}={}",
                data.len(),
                width,
                height,
                width * height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a field by evaluating `f(row, col)` at every cell
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                data.push(f(row, col));
            }
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get mutable reference to field data
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Grid shape as `(height, width)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Number of cells
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the field has no cells
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        assert!(
            row < self.height && col < self.width,
            "Coordinates out of bounds"
        );
        self.data[row * self.width + col]
    }

    /// Set value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        assert!(
            row < self.height && col < self.width,
            "Coordinates out of bounds"
        );
        self.data[row * self.width + col] = value;
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    /// Smallest value (NaN-free fields only)
    #[must_use]
    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Largest value (NaN-free fields only)
    #[must_use]
    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Arithmetic mean, accumulated in f64
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / self.data.len() as f64
    }

    /// Whether every value is finite
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Same grid shape as `other`
    #[must_use]
    pub fn same_shape(&self, other: &Field) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Boolean mask of cells at or above `threshold`
    #[must_use]
    pub fn threshold_mask(&self, threshold: f32) -> Vec<bool> {
        self.data.iter().map(|&v| v >= threshold).collect()
    }
}

/// Ordered conditioning window, oldest field first
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSequence {
    fields: Vec<Field>,
}

impl FieldSequence {
    /// Create a sequence from fields ordered oldest to newest.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the sequence is empty or the grids
    /// differ in shape.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let Some(first) = fields.first() else {
            return Err(NowcastError::config("field sequence is empty"));
        };
        if let Some((i, bad)) = fields
            .iter()
            .enumerate()
            .find(|(_, f)| !f.same_shape(first))
        {
            return Err(NowcastError::config(format!(
                "field {i} has shape {:?}, expected {:?}",
                bad.shape(),
                first.shape()
            )));
        }
        Ok(Self { fields })
    }

    /// Number of fields in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false for a constructed sequence
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Grid shape `(height, width)` shared by every field
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.fields[0].shape()
    }

    /// Most recent observation
    #[must_use]
    pub fn last(&self) -> &Field {
        &self.fields[self.fields.len() - 1]
    }

    /// All fields, oldest first
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Smallest value across the whole window
    #[must_use]
    pub fn min(&self) -> f32 {
        self.fields.iter().map(Field::min).fold(f32::INFINITY, f32::min)
    }

    /// Keep only the newest `n` fields
    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let start = self.fields.len().saturating_sub(n);
        Self {
            fields: self.fields[start..].to_vec(),
        }
    }
}

/// Advection field in pixels per timestep, time-invariant over the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    /// Displacement along columns (x), pixels per timestep
    pub u: Field,
    /// Displacement along rows (y), pixels per timestep
    pub v: Field,
}

impl MotionField {
    /// Create a motion field from its two components.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the components differ in shape.
    pub fn new(u: Field, v: Field) -> Result<Self> {
        if !u.same_shape(&v) {
            return Err(NowcastError::config(format!(
                "motion components differ in shape: u {:?}, v {:?}",
                u.shape(),
                v.shape()
            )));
        }
        Ok(Self { u, v })
    }

    /// Spatially uniform motion
    #[must_use]
    pub fn uniform(width: usize, height: usize, u: f32, v: f32) -> Self {
        Self {
            u: Field::with_value(width, height, u),
            v: Field::with_value(width, height, v),
        }
    }

    /// Grid shape `(height, width)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.u.shape()
    }

    /// Whether both components are finite everywhere
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.u.is_finite() && self.v.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_creation() {
        let field = Field::new(10, 20);
        assert_eq!(field.width, 10);
        assert_eq!(field.height, 20);
        assert_eq!(field.data.len(), 200);
        assert!(field.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_field_get_set() {
        let mut field = Field::new(10, 10);
        field.set(4, 3, 123.45);
        assert_eq!(field.get(4, 3), 123.45);

        // Verify row-major indexing
        let index = 4 * 10 + 3;
        assert_eq!(field.data[index], 123.45);
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_field_bounds_check() {
        let field = Field::new(10, 10);
        let _ = field.get(5, 10);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Field::from_vec(3, 3, vec![0.0; 8]).is_err());
        assert!(Field::from_vec(0, 3, vec![]).is_err());
        assert!(Field::from_vec(3, 3, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn test_sequence_rejects_mixed_shapes() {
        let err = FieldSequence::new(vec![Field::new(4, 4), Field::new(5, 4)]);
        assert!(matches!(err, Err(NowcastError::Configuration(_))));
        assert!(FieldSequence::new(vec![]).is_err());
    }

    #[test]
    fn test_sequence_tail_and_min() {
        let seq = FieldSequence::new(vec![
            Field::with_value(2, 2, -3.0),
            Field::with_value(2, 2, 1.0),
            Field::with_value(2, 2, 2.0),
        ])
        .unwrap();
        assert_eq!(seq.min(), -3.0);
        let tail = seq.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.last().get(0, 0), 2.0);
        assert_eq!(tail.min(), 1.0);
    }

    #[test]
    fn test_field_stats() {
        let field = Field::from_fn(3, 2, |r, c| (r * 3 + c) as f32);
        assert_eq!(field.min(), 0.0);
        assert_eq!(field.max(), 5.0);
        assert!((field.mean() - 2.5).abs() < 1e-12);
        assert_eq!(
            field.threshold_mask(3.0),
            vec![false, false, false, true, true, true]
        );
    }
}
