//! Type promotion.
//!
//! `promote` computes the least general type able to hold values of both
//! inputs. It is commutative and the result is nullable when either input
//! is.

use crate::error::TypePromotionError;
use crate::types::{DataType, TypeKind};

/// Find the common supertype of two types.
pub fn promote(left: &DataType, right: &DataType) -> Result<DataType, TypePromotionError> {
    let nullable = left.is_nullable() || right.is_nullable();
    let kind = promote_kind(left, right).ok_or_else(|| TypePromotionError::new(left, right))?;
    Ok(DataType::new(kind).with_nullable(nullable))
}

/// Fold `promote` over a sequence of types.
pub fn promote_all<'a, I>(types: I) -> Result<Option<DataType>, TypePromotionError>
where
    I: IntoIterator<Item = &'a DataType>,
{
    let mut acc: Option<DataType> = None;
    for ty in types {
        acc = Some(match acc {
            None => ty.clone(),
            Some(prev) => promote(&prev, ty)?,
        });
    }
    Ok(acc)
}

/// Whether a value of type `from` can be used where `to` is expected
/// without an explicit cast.
pub fn can_cast_implicit(from: &DataType, to: &DataType) -> bool {
    match promote(from, to) {
        Ok(common) => common.kind() == to.kind(),
        Err(_) => false,
    }
}

fn promote_kind(left: &DataType, right: &DataType) -> Option<TypeKind> {
    let (a, b) = (left.kind(), right.kind());
    if a == b {
        return Some(a.clone());
    }
    match (a, b) {
        (TypeKind::Null, other) | (other, TypeKind::Null) => Some(other.clone()),

        _ if left.is_integer() && right.is_integer() => promote_integers(left, right),

        _ if left.is_floating() && right.is_floating() => Some(TypeKind::Float64),
        _ if left.is_integer() && right.is_floating() => Some(int_float(left, right)),
        _ if left.is_floating() && right.is_integer() => Some(int_float(right, left)),

        (
            TypeKind::Decimal {
                precision: p1,
                scale: s1,
            },
            TypeKind::Decimal {
                precision: p2,
                scale: s2,
            },
        ) => Some(TypeKind::Decimal {
            precision: max_opt(*p1, *p2),
            scale: max_opt(*s1, *s2),
        }),
        (TypeKind::Decimal { precision, scale }, _) if right.is_integer() => {
            Some(decimal_int(*precision, *scale, right))
        }
        (_, TypeKind::Decimal { precision, scale }) if left.is_integer() => {
            Some(decimal_int(*precision, *scale, left))
        }
        (TypeKind::Decimal { .. }, _) if right.is_floating() => Some(TypeKind::Float64),
        (_, TypeKind::Decimal { .. }) if left.is_floating() => Some(TypeKind::Float64),

        (TypeKind::Date, ts @ TypeKind::Timestamp { .. })
        | (ts @ TypeKind::Timestamp { .. }, TypeKind::Date) => Some(ts.clone()),

        (TypeKind::Array(x), TypeKind::Array(y)) => {
            promote(x, y).ok().map(|t| TypeKind::Array(Box::new(t)))
        }
        (TypeKind::Map(k1, v1), TypeKind::Map(k2, v2)) => {
            let key = promote(k1, k2).ok()?;
            let value = promote(v1, v2).ok()?;
            Some(TypeKind::Map(Box::new(key), Box::new(value)))
        }
        (TypeKind::Struct(f1), TypeKind::Struct(f2)) => {
            if f1.len() != f2.len() {
                return None;
            }
            let mut fields = Vec::with_capacity(f1.len());
            for ((n1, t1), (n2, t2)) in f1.iter().zip(f2) {
                if n1 != n2 {
                    return None;
                }
                fields.push((n1.clone(), promote(t1, t2).ok()?));
            }
            Some(TypeKind::Struct(fields))
        }

        _ => None,
    }
}

fn promote_integers(left: &DataType, right: &DataType) -> Option<TypeKind> {
    let lw = left.bit_width()?;
    let rw = right.bit_width()?;
    match (left.is_signed_integer(), right.is_signed_integer()) {
        (true, true) => Some(signed(lw.max(rw))),
        (false, false) => Some(unsigned(lw.max(rw))),
        (true, false) => Some(mixed_sign(lw, rw)),
        (false, true) => Some(mixed_sign(rw, lw)),
    }
}

fn mixed_sign(signed_width: u32, unsigned_width: u32) -> TypeKind {
    if signed_width > unsigned_width {
        signed(signed_width)
    } else if unsigned_width < 64 {
        signed(unsigned_width * 2)
    } else {
        TypeKind::Decimal {
            precision: Some(20),
            scale: Some(0),
        }
    }
}

fn int_float(int: &DataType, float: &DataType) -> TypeKind {
    match float.kind() {
        TypeKind::Float32 if int.bit_width().unwrap_or(64) >= 32 => TypeKind::Float64,
        other => other.clone(),
    }
}

fn decimal_int(precision: Option<u8>, scale: Option<u8>, int: &DataType) -> TypeKind {
    let digits: u8 = match (int.bit_width(), int.is_signed_integer()) {
        (Some(8), _) => 3,
        (Some(16), _) => 5,
        (Some(32), _) => 10,
        (_, true) => 19,
        (_, false) => 20,
    };
    let precision = precision.map(|p| p.max(scale.unwrap_or(0).saturating_add(digits)).min(38));
    TypeKind::Decimal { precision, scale }
}

fn max_opt(a: Option<u8>, b: Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

fn signed(width: u32) -> TypeKind {
    match width {
        8 => TypeKind::Int8,
        16 => TypeKind::Int16,
        32 => TypeKind::Int32,
        _ => TypeKind::Int64,
    }
}

fn unsigned(width: u32) -> TypeKind {
    match width {
        8 => TypeKind::UInt8,
        16 => TypeKind::UInt16,
        32 => TypeKind::UInt32,
        _ => TypeKind::UInt64,
    }
}
