//! Node validation.
//!
//! Every node is built through [`derive_output`], which checks the
//! operation's arguments against its contract and computes the result it
//! declares. An invalid operation never becomes a node.

use tessera_types::{can_cast_implicit, promote, promote_all, DataType, Schema, TypeKind, Value};

use crate::analytics::udf::UdfKind;
use crate::error::{IrError, ValidationError};
use crate::ir::{BinaryOp, FrameBound, FrameKind, Op, ReductionFunc, UnaryOp};
use crate::lineage::{column_tables, foreign_column, Reach};
use crate::node::{Node, NodeRef, OpKind, Output};

pub(crate) fn derive_output(op: &Op) -> Result<Output, IrError> {
    match op {
        Op::UnboundTable { schema, .. } | Op::DatabaseTable { schema, .. } => {
            Ok(Output::Table(schema.clone()))
        }

        Op::Projection { table, selections } => {
            let _ = relation("Projection", "table", table)?;
            let mut fields = Vec::with_capacity(selections.len());
            for sel in selections {
                let ty = value("Projection", "selections", sel)?;
                rooted(sel, &[table], Reach::Columns)?;
                fields.push((sel.name()?, ty.clone()));
            }
            Ok(Output::Table(Schema::from_fields(fields)?))
        }

        Op::Filter { table, predicates } => {
            let schema = relation("Filter", "table", table)?;
            for pred in predicates {
                boolean("Filter", "predicates", pred)?;
                rooted(pred, &[table], Reach::Columns)?;
            }
            Ok(Output::Table(schema.clone()))
        }

        Op::Sort { table, keys } => {
            let schema = relation("Sort", "table", table)?;
            for key in keys {
                sort_key("Sort", "keys", key)?;
                rooted(key, &[table], Reach::Columns)?;
            }
            Ok(Output::Table(schema.clone()))
        }

        Op::Limit { table, .. } => Ok(Output::Table(relation("Limit", "table", table)?.clone())),

        Op::Aggregation { table, metrics, by } => {
            let _ = relation("Aggregation", "table", table)?;
            let mut fields = Vec::with_capacity(by.len() + metrics.len());
            for key in by {
                let ty = value("Aggregation", "by", key)?;
                rooted(key, &[table], Reach::Columns)?;
                fields.push((key.name()?, ty.clone()));
            }
            for metric in metrics {
                let ty = value("Aggregation", "metrics", metric)?;
                if !metric.output().is_scalar() {
                    return Err(IrError::TypeMismatch {
                        op: "Aggregation".to_string(),
                        arg: "metrics".to_string(),
                        expected: "a reduction".to_string(),
                        found: metric.kind().name(),
                    });
                }
                rooted(metric, &[table], Reach::Values)?;
                fields.push((metric.name()?, ty.clone()));
            }
            Ok(Output::Table(Schema::from_fields(fields)?))
        }

        Op::Join {
            kind,
            left,
            right,
            predicates,
        } => {
            let op_name = OpKind::Join(*kind).name();
            let left_schema = relation(&op_name, "left", left)?;
            let right_schema = relation(&op_name, "right", right)?;
            for pred in predicates {
                boolean(&op_name, "predicates", pred)?;
                rooted(pred, &[left, right], Reach::Columns)?;
            }
            if kind.is_filtering() {
                return Ok(Output::Table(left_schema.clone()));
            }
            let mut fields: Vec<(String, DataType)> = left_schema
                .iter()
                .map(|(n, t)| (n.to_string(), t.clone()))
                .collect();
            for (name, ty) in right_schema.iter() {
                let name = if left_schema.contains(name) {
                    format!("{}_right", name)
                } else {
                    name.to_string()
                };
                fields.push((name, ty.clone()));
            }
            Ok(Output::Table(Schema::from_fields(fields)?))
        }

        Op::SetOp {
            kind, left, right, ..
        } => {
            let op_name = OpKind::SetOp(*kind).name();
            let left_schema = relation(&op_name, "left", left)?;
            let right_schema = relation(&op_name, "right", right)?;
            if left_schema != right_schema {
                return Err(IrError::relation(format!(
                    "{} inputs must have identical schemas",
                    op_name
                )));
            }
            Ok(Output::Table(left_schema.clone()))
        }

        Op::Literal { value, dtype } => {
            let inferred = value.infer_type();
            let compatible = value.is_null()
                || can_cast_implicit(&inferred, dtype)
                || (matches!(value, Value::String(_)) && dtype.is_temporal());
            if !compatible {
                return Err(IrError::type_mismatch("Literal", "value", dtype.to_string(), &inferred));
            }
            Ok(Output::Scalar(dtype.clone()))
        }

        Op::TableColumn { table, name } => {
            let schema = relation("TableColumn", "table", table)?;
            schema
                .get(name)
                .map(|ty| Output::Column(ty.clone()))
                .ok_or_else(|| IrError::ColumnNotFound(name.clone()))
        }

        Op::Alias { arg, .. } => {
            value("Alias", "arg", arg)?;
            Ok(arg.output().clone())
        }

        Op::Binary { op, left, right } => binary(*op, left, right),

        Op::Unary { op, arg } => unary(*op, arg),

        Op::Cast { arg, to } => {
            value("Cast", "arg", arg)?;
            Ok(shaped(&[arg], to.clone()))
        }

        Op::IsIn { arg, options } => {
            let ty = value("IsIn", "arg", arg)?;
            for option in options {
                let option_ty = value("IsIn", "options", option)?;
                if promote(ty, option_ty).is_err() {
                    return Err(IrError::type_mismatch(
                        "IsIn",
                        "options",
                        format!("comparable with {}", ty),
                        option_ty,
                    ));
                }
            }
            Ok(shaped(&[arg], DataType::boolean()))
        }

        Op::Like { arg, .. } => {
            let ty = value("Like", "arg", arg)?;
            if !ty.is_string() {
                return Err(IrError::type_mismatch("Like", "arg", "string", ty));
            }
            Ok(shaped(&[arg], DataType::boolean()))
        }

        Op::Extract { part, arg } => {
            let name = OpKind::Extract(*part).name();
            let ty = value(&name, "arg", arg)?;
            let ok = ty.is_temporal()
                && !(part.needs_time() && matches!(ty.kind(), TypeKind::Date))
                && !(!part.needs_time() && matches!(ty.kind(), TypeKind::Time));
            if !ok {
                return Err(IrError::type_mismatch(name, "arg", "temporal", ty));
            }
            Ok(shaped(&[arg], DataType::int32()))
        }

        Op::SearchedCase {
            conditions,
            results,
            default,
        } => {
            if conditions.is_empty() || conditions.len() != results.len() {
                return Err(IrError::TypeMismatch {
                    op: "SearchedCase".to_string(),
                    arg: "results".to_string(),
                    expected: format!("{} results", conditions.len().max(1)),
                    found: results.len().to_string(),
                });
            }
            for cond in conditions {
                boolean("SearchedCase", "conditions", cond)?;
            }
            let mut types = Vec::with_capacity(results.len() + 1);
            for result in results {
                types.push(value("SearchedCase", "results", result)?);
            }
            types.push(value("SearchedCase", "default", default)?);
            let ty = promote_all(types)?.unwrap_or_else(DataType::null);
            let mut inputs: Vec<&NodeRef> = conditions.iter().chain(results).collect();
            inputs.push(default);
            Ok(shaped(&inputs, ty))
        }

        Op::Reduction { func, arg, filter } => {
            let name = OpKind::Reduction(*func).name();
            let ty = value(&name, "arg", arg)?;
            if let Some(filter) = filter {
                boolean(&name, "where", filter)?;
            }
            Ok(Output::Scalar(reduction_type(*func, &name, ty)?))
        }

        Op::CountStar { table } => {
            relation("CountStar", "table", table)?;
            Ok(Output::Scalar(DataType::int64().with_nullable(false)))
        }

        Op::RowNumber => Ok(Output::Column(DataType::int64().with_nullable(false))),

        Op::Rank { arg, .. } => {
            let ty = value("Rank", "arg", arg)?;
            if !ty.is_orderable() {
                return Err(IrError::type_mismatch("Rank", "arg", "orderable", ty));
            }
            Ok(Output::Column(DataType::int64().with_nullable(false)))
        }

        Op::Shift { kind, arg, .. } => {
            let ty = value(&format!("{:?}", kind), "arg", arg)?;
            Ok(Output::Column(ty.with_nullable(true)))
        }

        Op::WindowFunction {
            func,
            group_by,
            order_by,
            frame,
            start,
            end,
        } => {
            let ty = value("WindowFunction", "func", func)?;
            if !is_windowable(func) {
                return Err(ValidationError::NotWindowable(func.kind().name()).into());
            }
            for key in group_by {
                value("WindowFunction", "group_by", key)?;
            }
            for key in order_by {
                sort_key("WindowFunction", "order_by", key)?;
            }
            check_frame(*frame, order_by, start, end)?;
            Ok(Output::Column(ty.clone()))
        }

        Op::SortKey { expr, .. } => {
            let ty = value("SortKey", "expr", expr)?;
            Ok(shaped(&[expr], ty.clone()))
        }

        Op::Bucket {
            arg,
            edges,
            include_under,
            include_over,
            ..
        } => {
            numeric("Bucket", "arg", arg)?;
            if edges.is_empty() {
                return Err(ValidationError::EmptyEdges.into());
            }
            let bounds = edges
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<f64>>>()
                .ok_or(ValidationError::UnorderedEdges)?;
            if bounds.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ValidationError::UnorderedEdges.into());
            }
            if edges.len() == 1 && !(*include_under && *include_over) {
                return Err(ValidationError::SingleEdge.into());
            }
            let n = op.nbuckets().map(|n| n as u64);
            Ok(shaped(&[arg], DataType::category(n)))
        }

        Op::Histogram {
            arg,
            nbins,
            binwidth,
            base,
            ..
        } => {
            numeric("Histogram", "arg", arg)?;
            match (nbins, binwidth) {
                (Some(0), None) => return Err(ValidationError::HistogramBins.into()),
                (Some(_), None) => {}
                (None, Some(width)) if width.as_f64().is_some_and(|w| w > 0.0) => {}
                _ => return Err(ValidationError::HistogramBins.into()),
            }
            if base.as_ref().is_some_and(|b| !b.is_numeric()) {
                return Err(IrError::TypeMismatch {
                    op: "Histogram".to_string(),
                    arg: "base".to_string(),
                    expected: "numeric".to_string(),
                    found: base
                        .as_ref()
                        .map(|b| b.infer_type().to_string())
                        .unwrap_or_default(),
                });
            }
            Ok(shaped(&[arg], DataType::int64()))
        }

        Op::TopK { arg, k, by } => {
            value("TopK", "arg", arg)?;
            if *k == 0 {
                return Err(ValidationError::TopKCount.into());
            }
            value("TopK", "by", by)?;
            if !by.output().is_scalar() {
                return Err(IrError::TypeMismatch {
                    op: "TopK".to_string(),
                    arg: "by".to_string(),
                    expected: "a reduction".to_string(),
                    found: by.kind().name(),
                });
            }
            let tables = column_tables(arg);
            let tables: Vec<&NodeRef> = tables.iter().collect();
            rooted(by, &tables, Reach::Values)?;
            Ok(Output::Column(DataType::boolean()))
        }

        Op::SummaryFilter { expr } => {
            if expr.kind() != OpKind::TopK {
                return Err(IrError::TypeMismatch {
                    op: "SummaryFilter".to_string(),
                    arg: "expr".to_string(),
                    expected: "TopK".to_string(),
                    found: expr.kind().name(),
                });
            }
            Ok(Output::Column(DataType::boolean()))
        }

        Op::Udf { func, args } => {
            let inputs = func.input_types();
            if inputs.len() != args.len() {
                return Err(IrError::TypeMismatch {
                    op: func.name().to_string(),
                    arg: "args".to_string(),
                    expected: format!("{} arguments", inputs.len()),
                    found: args.len().to_string(),
                });
            }
            for (i, (arg, expected)) in args.iter().zip(inputs).enumerate() {
                let ty = value(func.name(), "args", arg)?;
                if !can_cast_implicit(ty, expected) {
                    return Err(IrError::type_mismatch(
                        func.name(),
                        format!("args[{}]", i),
                        expected.to_string(),
                        ty,
                    ));
                }
            }
            let out = func.output_type().clone();
            Ok(match func.kind() {
                UdfKind::Reduction => Output::Scalar(out),
                UdfKind::Analytic => Output::Column(out),
                UdfKind::Elementwise => shaped(&args.iter().collect::<Vec<_>>(), out),
            })
        }
    }
}

impl Node {
    /// Name a value node takes when selected.
    ///
    /// Columns and aliases carry their own name; most other operations
    /// inherit the name of their first argument.
    pub fn name(&self) -> Result<String, IrError> {
        match self.op() {
            Op::TableColumn { name, .. } | Op::Alias { name, .. } => Ok(name.clone()),
            Op::CountStar { .. } => Ok("count".to_string()),
            Op::RowNumber => Ok("row_number".to_string()),
            Op::Udf { func, .. } => Ok(func.name().to_string()),
            Op::Literal { .. } | Op::SearchedCase { .. } => {
                Err(IrError::UnnamedExpression(self.kind().name()))
            }
            _ if self.is_relation() => Err(IrError::UnnamedExpression(self.kind().name())),
            _ => self
                .children()
                .first()
                .ok_or_else(|| IrError::UnnamedExpression(self.kind().name()))?
                .name(),
        }
    }
}

fn relation<'a>(op: &str, arg: &str, node: &'a NodeRef) -> Result<&'a Schema, IrError> {
    node.schema().ok_or_else(|| IrError::TypeMismatch {
        op: op.to_string(),
        arg: arg.to_string(),
        expected: "a table".to_string(),
        found: node.kind().name(),
    })
}

fn value<'a>(op: &str, arg: &str, node: &'a NodeRef) -> Result<&'a DataType, IrError> {
    node.dtype().ok_or_else(|| IrError::TypeMismatch {
        op: op.to_string(),
        arg: arg.to_string(),
        expected: "a value".to_string(),
        found: "table".to_string(),
    })
}

fn boolean(op: &str, arg: &str, node: &NodeRef) -> Result<(), IrError> {
    let ty = value(op, arg, node)?;
    if ty.is_boolean() || ty.is_null() {
        Ok(())
    } else {
        Err(IrError::type_mismatch(op, arg, "boolean", ty))
    }
}

fn numeric(op: &str, arg: &str, node: &NodeRef) -> Result<(), IrError> {
    let ty = value(op, arg, node)?;
    if ty.is_numeric() {
        Ok(())
    } else {
        Err(IrError::type_mismatch(op, arg, "numeric", ty))
    }
}

fn sort_key(op: &str, arg: &str, node: &NodeRef) -> Result<(), IrError> {
    if node.kind() == OpKind::SortKey {
        Ok(())
    } else {
        Err(IrError::TypeMismatch {
            op: op.to_string(),
            arg: arg.to_string(),
            expected: "a sort key".to_string(),
            found: node.kind().name(),
        })
    }
}

fn rooted(node: &NodeRef, tables: &[&NodeRef], reach: Reach) -> Result<(), IrError> {
    match foreign_column(node, tables, reach) {
        None => Ok(()),
        Some(name) => Err(IrError::relation(format!(
            "column '{}' does not belong to the table it is used with",
            name
        ))),
    }
}

/// Column when any input is a column, scalar otherwise.
fn shaped(inputs: &[&NodeRef], ty: DataType) -> Output {
    if inputs.iter().any(|n| n.output().is_column()) {
        Output::Column(ty)
    } else {
        Output::Scalar(ty)
    }
}

fn binary(op: BinaryOp, left: &NodeRef, right: &NodeRef) -> Result<Output, IrError> {
    let name = format!("{:?}", op);
    let lt = value(&name, "left", left)?;
    let rt = value(&name, "right", right)?;
    let nullable = lt.is_nullable() || rt.is_nullable();

    let ty = if op.is_arithmetic() {
        arithmetic_type(op, lt, rt).ok_or_else(|| {
            let (arg, found) = if lt.is_numeric() || lt.is_temporal() || lt.is_interval() {
                ("right", rt)
            } else {
                ("left", lt)
            };
            IrError::type_mismatch(&name, arg, "numeric", found)
        })?
    } else if op.is_comparison() {
        let comparable = promote(lt, rt).is_ok()
            || (lt.is_temporal() && rt.is_string())
            || (lt.is_string() && rt.is_temporal());
        if !comparable {
            return Err(IrError::type_mismatch(
                &name,
                "right",
                format!("comparable with {}", lt),
                rt,
            ));
        }
        let ordering = !matches!(op, BinaryOp::Eq | BinaryOp::Ne);
        if ordering && !(lt.is_orderable() || lt.is_null()) {
            return Err(IrError::type_mismatch(&name, "left", "orderable", lt));
        }
        DataType::boolean().with_nullable(nullable)
    } else {
        boolean(&name, "left", left)?;
        boolean(&name, "right", right)?;
        DataType::boolean().with_nullable(nullable)
    };
    Ok(shaped(&[left, right], ty))
}

fn arithmetic_type(op: BinaryOp, lt: &DataType, rt: &DataType) -> Option<DataType> {
    let nullable = lt.is_nullable() || rt.is_nullable();
    if (lt.is_numeric() || lt.is_null()) && (rt.is_numeric() || rt.is_null()) {
        let common = promote(lt, rt).ok()?;
        return Some(match op {
            BinaryOp::Div if !common.is_decimal() => DataType::float64().with_nullable(nullable),
            _ => common,
        });
    }
    match op {
        BinaryOp::Add | BinaryOp::Sub if lt.is_temporal() && rt.is_interval() => Some(lt.clone()),
        BinaryOp::Add if lt.is_interval() && rt.is_temporal() => Some(rt.clone()),
        BinaryOp::Add | BinaryOp::Sub if lt.is_interval() && rt.is_interval() => {
            promote(lt, rt).ok()
        }
        BinaryOp::Sub if lt.is_temporal() && lt.kind() == rt.kind() => {
            let unit = match lt.kind() {
                TypeKind::Date => tessera_types::IntervalUnit::Day,
                _ => tessera_types::IntervalUnit::Second,
            };
            Some(DataType::interval(unit).with_nullable(nullable))
        }
        _ => None,
    }
}

fn unary(op: UnaryOp, arg: &NodeRef) -> Result<Output, IrError> {
    let name = format!("{:?}", op);
    let ty = value(&name, "arg", arg)?;
    let out = match op {
        UnaryOp::Not => {
            boolean(&name, "arg", arg)?;
            ty.clone()
        }
        UnaryOp::IsNull | UnaryOp::NotNull => DataType::boolean().with_nullable(false),
        UnaryOp::Negate if ty.is_numeric() || ty.is_interval() => ty.clone(),
        UnaryOp::Abs if ty.is_numeric() => ty.clone(),
        UnaryOp::Floor | UnaryOp::Ceil if ty.is_integer() => ty.clone(),
        UnaryOp::Floor | UnaryOp::Ceil if ty.is_numeric() => {
            DataType::int64().with_nullable(ty.is_nullable())
        }
        _ => return Err(IrError::type_mismatch(&name, "arg", "numeric", ty)),
    };
    Ok(shaped(&[arg], out))
}

fn reduction_type(func: ReductionFunc, name: &str, ty: &DataType) -> Result<DataType, IrError> {
    let numeric_like = ty.is_numeric() || ty.is_boolean();
    Ok(match func {
        ReductionFunc::Count => DataType::int64().with_nullable(false),
        ReductionFunc::Min | ReductionFunc::Max if ty.is_orderable() => ty.clone(),
        ReductionFunc::Sum if ty.is_unsigned_integer() => DataType::uint64(),
        ReductionFunc::Sum if ty.is_integer() || ty.is_boolean() => DataType::int64(),
        ReductionFunc::Sum if ty.is_decimal() => match ty.kind() {
            TypeKind::Decimal { scale, .. } => DataType::new(TypeKind::Decimal {
                precision: Some(38),
                scale: *scale,
            }),
            _ => ty.clone(),
        },
        ReductionFunc::Sum if ty.is_floating() => DataType::float64(),
        ReductionFunc::Mean | ReductionFunc::Std | ReductionFunc::Var if numeric_like => {
            DataType::float64()
        }
        _ => {
            let expected = match func {
                ReductionFunc::Min | ReductionFunc::Max => "orderable",
                _ => "numeric",
            };
            return Err(IrError::type_mismatch(name, "arg", expected, ty));
        }
    })
}

fn is_windowable(func: &NodeRef) -> bool {
    match func.op() {
        Op::Reduction { .. }
        | Op::CountStar { .. }
        | Op::RowNumber
        | Op::Rank { .. }
        | Op::Shift { .. } => true,
        Op::Udf { func, .. } => matches!(func.kind(), UdfKind::Reduction | UdfKind::Analytic),
        _ => false,
    }
}

fn check_frame(
    frame: FrameKind,
    order_by: &[NodeRef],
    start: &FrameBound,
    end: &FrameBound,
) -> Result<(), ValidationError> {
    let frame_error = |msg: &str| ValidationError::Frame(msg.to_string());

    match frame {
        FrameKind::Rows => {
            for bound in [start, end] {
                if let Some(offset) = bound.offset() {
                    if !offset.as_i64().is_some_and(|n| n >= 0) {
                        return Err(frame_error("rows offsets must be non-negative integers"));
                    }
                }
            }
        }
        FrameKind::Range => {
            let [key] = order_by else {
                return Err(frame_error("a range frame requires exactly one order key"));
            };
            let key_ty = key.dtype().cloned().unwrap_or_else(DataType::null);
            if !(key_ty.is_numeric() || key_ty.is_temporal()) {
                return Err(frame_error("a range frame order key must be numeric or temporal"));
            }
            for offset in [start.offset(), end.offset()].into_iter().flatten() {
                match offset {
                    Value::Interval { .. } if key_ty.is_temporal() => {}
                    Value::Interval { .. } => {
                        return Err(frame_error("interval bounds require a temporal order key"))
                    }
                    v if v.is_numeric() && key_ty.is_numeric() => {}
                    _ => return Err(frame_error("range bounds must match the order key's type")),
                }
            }
        }
    }

    let comparable = match (start.offset(), end.offset()) {
        (Some(Value::Interval { unit: a, .. }), Some(Value::Interval { unit: b, .. })) => a == b,
        _ => true,
    };
    if comparable {
        if let (Some(lo), Some(hi)) = (start.position(true), end.position(false)) {
            if lo > hi {
                return Err(frame_error("frame start is after its end"));
            }
        }
    }
    Ok(())
}
