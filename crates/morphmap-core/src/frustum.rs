//! 视锥体
//!
//! 从视图投影矩阵中提取六个裁剪平面（OpenGL 约定，裁剪空间 z 在 `[-1, 1]`），
//! 平面法线指向视锥内部。

use crate::error::CoreError;
use crate::math::{BoundingBox3, Matrix4, Point3, Vector3, Vector4};

/// 平面 `normal · p + d = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3,
    pub d: f64,
}

impl Plane {
    fn from_coefficients(v: Vector4) -> Option<Self> {
        let normal = Vector3::new(v.x, v.y, v.z);
        let len = normal.norm();
        if !len.is_finite() || len <= f64::EPSILON {
            return None;
        }
        Some(Self {
            normal: normal / len,
            d: v.w / len,
        })
    }

    /// 点到平面的有符号距离，内侧为正
    #[inline]
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&p.coords) + self.d
    }
}

/// 六平面视锥
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// 依次为 left, right, bottom, top, near, far
    pub planes: [Plane; 6],
}

impl Frustum {
    /// 从视图投影矩阵提取
    pub fn from_view_projection(m: &Matrix4) -> Result<Self, CoreError> {
        if m.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::DegenerateCamera("non-finite view projection".into()));
        }

        let row = |i: usize| -> Vector4 { m.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let coefficients = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2];

        let mut planes = [Plane {
            normal: Vector3::zeros(),
            d: 0.0,
        }; 6];
        for (plane, c) in planes.iter_mut().zip(coefficients) {
            *plane = Plane::from_coefficients(c)
                .ok_or_else(|| CoreError::DegenerateCamera("collapsed frustum plane".into()))?;
        }
        Ok(Self { planes })
    }

    /// 包围盒是否与视锥相交（保守判断）
    ///
    /// 对每个平面取沿法线最靠前的角点，只要它在某个平面外侧，整个盒子都在外侧。
    pub fn intersects_aabb(&self, bbox: &BoundingBox3) -> bool {
        if !bbox.is_valid() {
            return false;
        }
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(&bbox.positive_vertex(&plane.normal)) >= 0.0)
    }

    /// 点是否在视锥内
    pub fn contains_point(&self, p: &Point3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(p) >= 0.0)
    }
}
