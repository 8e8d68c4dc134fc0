use crate::data::ShapeType;

/// Known finding labels and the shape type annotators are expected to use
/// for each. A label missing from this table is a data-quality error; a
/// type disagreement is only a warning.
const LABEL_TABLE: &[(&str, ShapeType)] = &[
    ("nodule", ShapeType::Polygon),
    ("mass", ShapeType::Polygon),
    ("consolidation", ShapeType::Polygon),
    ("pleural effusion", ShapeType::Polygon),
    ("pneumothorax", ShapeType::Polygon),
    ("atelectasis", ShapeType::Polygon),
    ("fibrosis", ShapeType::Polygon),
    ("emphysema", ShapeType::Polygon),
    ("cardiomegaly", ShapeType::Rectangle),
    ("pacemaker", ShapeType::Rectangle),
    ("calcification", ShapeType::Point),
    ("rib fracture", ShapeType::Linestrip),
    ("catheter", ShapeType::Linestrip),
    ("tracheal deviation", ShapeType::Line),
];

/// Expected shape type for a label, or `None` for an unknown label.
pub fn expected_shape_type(label: &str) -> Option<ShapeType> {
    LABEL_TABLE
        .iter()
        .find(|(name, _)| *name == label)
        .map(|&(_, ty)| ty)
}
