//! Entity index over a parsed Part 21 data section.
//!
//! Keeps each instance's records without interpreting them. Complex
//! instances (`#5 = (A(..) B(..));`) keep one record per partial type, so a
//! lookup by type name finds an instance through any of its parts.

use std::collections::HashMap;

use ruststep::ast::{DataSection, EntityInstance, Name, Parameter, Record};
use stepglb_kernel_math::{Placement, Point3, Vec3};

/// One partial record of an entity instance.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Upper-case type name, e.g. `AXIS2_PLACEMENT_3D`.
    pub type_name: String,
    /// Positional attributes.
    pub args: Vec<Parameter>,
}

/// A data-section entity instance.
#[derive(Debug, Clone)]
pub struct StepEntity {
    /// Instance id (from `#123`).
    pub id: u64,
    /// One record for simple instances, several for complex ones.
    pub records: Vec<StepRecord>,
}

impl StepEntity {
    /// The record with the given type name, if this instance has one.
    pub fn record(&self, type_name: &str) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.type_name == type_name)
    }

    /// Attributes of the first record.
    pub fn args(&self) -> &[Parameter] {
        self.records.first().map(|r| r.args.as_slice()).unwrap_or(&[])
    }

    /// Type name of the first record.
    pub fn type_name(&self) -> &str {
        self.records.first().map(|r| r.type_name.as_str()).unwrap_or("")
    }

    /// Whether any record has the given type name.
    pub fn is(&self, type_name: &str) -> bool {
        self.record(type_name).is_some()
    }
}

/// All instances of a data section, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: HashMap<u64, StepEntity>,
}

impl EntityIndex {
    /// Index every instance of `section`.
    pub fn from_data_section(section: &DataSection) -> Self {
        let entities = section
            .entities
            .iter()
            .map(|instance| {
                let entity = match instance {
                    EntityInstance::Simple { id, record } => StepEntity {
                        id: *id,
                        records: vec![to_record(record)],
                    },
                    EntityInstance::Complex { id, subsuper } => StepEntity {
                        id: *id,
                        records: subsuper.0.iter().map(to_record).collect(),
                    },
                };
                (entity.id, entity)
            })
            .collect();
        Self { entities }
    }

    /// Number of indexed instances.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get an entity by id.
    pub fn get(&self, id: u64) -> Option<&StepEntity> {
        self.entities.get(&id)
    }

    /// All entities having a record of the given type, sorted by id.
    pub fn entities_of_type(&self, type_name: &str) -> Vec<&StepEntity> {
        let mut found: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.is(type_name))
            .collect();
        found.sort_by_key(|e| e.id);
        found
    }

    /// All entities matching `predicate` on their first type name, sorted by id.
    pub fn entities_where(&self, predicate: impl Fn(&str) -> bool) -> Vec<&StepEntity> {
        let mut found: Vec<_> = self
            .entities
            .values()
            .filter(|e| e.records.iter().any(|r| predicate(&r.type_name)))
            .collect();
        found.sort_by_key(|e| e.id);
        found
    }

    /// Resolve a `CARTESIAN_POINT` to its coordinates.
    pub fn point(&self, id: u64) -> Option<Point3> {
        let c = coordinates(self.get(id)?.record("CARTESIAN_POINT")?)?;
        Some(Point3::new(c[0], c[1], c[2]))
    }

    /// Resolve a `DIRECTION` to its ratios.
    pub fn direction(&self, id: u64) -> Option<Vec3> {
        let c = coordinates(self.get(id)?.record("DIRECTION")?)?;
        Some(Vec3::new(c[0], c[1], c[2]))
    }

    /// Resolve an `AXIS2_PLACEMENT_3D` into a placement.
    ///
    /// A missing location resolves to the origin; missing axis and reference
    /// direction default to global Z and X.
    pub fn axis_placement(&self, id: u64) -> Option<Placement> {
        let record = self.get(id)?.record("AXIS2_PLACEMENT_3D")?;
        let location = ref_at(&record.args, 1)
            .and_then(|r| self.point(r))
            .unwrap_or_else(Point3::origin);
        let axis = ref_at(&record.args, 2).and_then(|r| self.direction(r));
        let ref_direction = ref_at(&record.args, 3).and_then(|r| self.direction(r));
        Some(Placement::from_axes(location, axis, ref_direction))
    }
}

fn to_record(record: &Record) -> StepRecord {
    let args = match &record.parameter {
        Parameter::List(items) => items.clone(),
        other => vec![other.clone()],
    };
    StepRecord {
        type_name: record.name.to_ascii_uppercase(),
        args,
    }
}

/// Entity reference at position `index`, if present.
pub fn ref_at(args: &[Parameter], index: usize) -> Option<u64> {
    as_ref(args.get(index)?)
}

/// Non-empty string at position `index`, if present.
pub fn string_at(args: &[Parameter], index: usize) -> Option<&str> {
    match args.get(index)? {
        Parameter::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Every entity reference in the list at position `index`.
pub fn refs_at(args: &[Parameter], index: usize) -> Vec<u64> {
    match args.get(index) {
        Some(Parameter::List(items)) => items.iter().filter_map(as_ref).collect(),
        Some(other) => as_ref(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn as_ref(parameter: &Parameter) -> Option<u64> {
    match parameter {
        Parameter::Ref(Name::Entity(id)) => Some(*id),
        _ => None,
    }
}

fn as_real(parameter: &Parameter) -> Option<f64> {
    match parameter {
        Parameter::Real(v) => Some(*v),
        Parameter::Integer(v) => Some(*v as f64),
        _ => None,
    }
}

/// The `(x, y, z)` list of a point or direction; 2D values get `z = 0`.
fn coordinates(record: &StepRecord) -> Option<[f64; 3]> {
    let Parameter::List(values) = record.args.get(1)? else {
        return None;
    };
    let mut out = [0.0; 3];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = as_real(value)?;
    }
    (values.len() >= 2).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(data: &str) -> EntityIndex {
        let text = format!(
            "ISO-10303-21;\nHEADER;\nFILE_DESCRIPTION((''),'2;1');\nFILE_NAME('t.step','',(''),(''),'','','');\nFILE_SCHEMA(('AUTOMOTIVE_DESIGN'));\nENDSEC;\nDATA;\n{data}\nENDSEC;\nEND-ISO-10303-21;\n"
        );
        let exchange = ruststep::parser::parse(&text).unwrap();
        EntityIndex::from_data_section(&exchange.data[0])
    }

    #[test]
    fn test_simple_entities() {
        let idx = index(
            "#1=CARTESIAN_POINT('',(1.0,2.0,3.0));\n#2=DIRECTION('',(0.0,0.0,1.0));\n#3=DIRECTION('',(1.0,0.0,0.0));\n#4=AXIS2_PLACEMENT_3D('',#1,#2,#3);",
        );
        assert_eq!(idx.len(), 4);
        assert_eq!(idx.get(1).unwrap().type_name(), "CARTESIAN_POINT");
        assert_eq!(idx.point(1), Some(Point3::new(1.0, 2.0, 3.0)));
        assert_eq!(idx.direction(2), Some(Vec3::z()));
        assert!(idx.point(2).is_none());

        let placement = idx.axis_placement(4).unwrap();
        assert_eq!(placement, Placement::translation(1.0, 2.0, 3.0));
        assert_eq!(idx.entities_of_type("DIRECTION").len(), 2);
        assert!(idx.get(99).is_none());
    }

    #[test]
    fn test_placement_with_unset_axes() {
        let idx = index("#1=CARTESIAN_POINT('',(0.0,0.0,5.0));\n#2=AXIS2_PLACEMENT_3D('',#1,$,$);");
        assert_eq!(idx.axis_placement(2), Some(Placement::translation(0.0, 0.0, 5.0)));
    }

    #[test]
    fn test_complex_entity_records() {
        let idx = index(
            "#10=(REPRESENTATION_RELATIONSHIP('a','b',#20,#21)REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION(#22)SHAPE_REPRESENTATION_RELATIONSHIP());",
        );
        let entity = idx.get(10).unwrap();
        assert_eq!(entity.records.len(), 3);
        let rel = entity.record("REPRESENTATION_RELATIONSHIP").unwrap();
        assert_eq!(ref_at(&rel.args, 2), Some(20));
        assert_eq!(ref_at(&rel.args, 3), Some(21));
        assert_eq!(string_at(&rel.args, 0), Some("a"));
        let with = entity
            .record("REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION")
            .unwrap();
        assert_eq!(ref_at(&with.args, 0), Some(22));
        assert_eq!(idx.entities_of_type("SHAPE_REPRESENTATION_RELATIONSHIP").len(), 1);
    }

    #[test]
    fn test_reference_lists() {
        let idx = index("#5=CLOSED_SHELL('',(#1,#2,#3));");
        let shell = idx.get(5).unwrap();
        assert_eq!(refs_at(shell.args(), 1), vec![1, 2, 3]);
        assert_eq!(string_at(shell.args(), 0), None);
    }
}
