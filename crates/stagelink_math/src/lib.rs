//! Math types shared by the stagelink crates.
//!
//! Re-exports glam and adds the bounds and transform helpers the stage
//! model and the synchronization engine need.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod interval;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use transform::Transform;

/// View a slice of vectors as raw bytes (for content hashing).
pub fn vec3_bytes(values: &[Vec3]) -> &[u8] {
    bytemuck::cast_slice(values)
}

/// View a slice of indices as raw bytes (for content hashing).
pub fn u32_bytes(values: &[u32]) -> &[u8] {
    bytemuck::cast_slice(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_bytes_length() {
        let points = [Vec3::ZERO, Vec3::ONE];
        assert_eq!(vec3_bytes(&points).len(), 2 * 3 * 4);
    }

    #[test]
    fn test_equal_slices_have_equal_bytes() {
        let a = [Vec3::new(1.0, 2.0, 3.0)];
        let b = [Vec3::new(1.0, 2.0, 3.0)];
        let c = [Vec3::new(1.0, 2.0, 3.5)];
        assert_eq!(vec3_bytes(&a), vec3_bytes(&b));
        assert_ne!(vec3_bytes(&a), vec3_bytes(&c));
    }

    #[test]
    fn test_u32_bytes_length() {
        assert_eq!(u32_bytes(&[0, 1, 2]).len(), 12);
    }
}
