use crate::convert::ConvertError;
use crate::document::MeshObject;

/// Wavefront OBJ text with one `o` block per object and polygon faces kept intact.
pub fn to_obj(objects: &[MeshObject]) -> String {
    let mut out = String::new();
    let mut offset = 1usize;

    for object in objects {
        out.push_str(&format!("o {}\n", object.name));
        for vertex in &object.vertices {
            out.push_str(&format!("v {} {} {}\n", vertex[0], vertex[1], vertex[2]));
        }
        for face in &object.faces {
            out.push('f');
            for index in face {
                out.push_str(&format!(" {}", index + offset));
            }
            out.push('\n');
        }
        offset += object.vertices.len();
    }

    out
}

/// Reads the subset of OBJ written by [`to_obj`] (plus `v/vt/vn` face references
/// and negative indices), rebasing face indices onto each object's own vertices.
pub fn parse_obj(source: &str, default_name: &str) -> Result<Vec<MeshObject>, ConvertError> {
    let mut objects: Vec<MeshObject> = Vec::new();
    let mut global_vertices = 0usize;
    let mut object_start = 0usize;

    for (line_no, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };

        match keyword {
            "o" | "g" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                objects.push(MeshObject {
                    name: if name.is_empty() {
                        default_name.to_string()
                    } else {
                        name
                    },
                    vertices: Vec::new(),
                    faces: Vec::new(),
                });
                object_start = global_vertices;
            }
            "v" => {
                let coords = parts
                    .take(3)
                    .map(|part| part.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| invalid(line_no, format!("invalid vertex coordinate: {err}")))?;
                if coords.len() != 3 {
                    return Err(invalid(line_no, "vertex needs three coordinates"));
                }
                current_object(&mut objects, default_name)
                    .vertices
                    .push([coords[0], coords[1], coords[2]]);
                global_vertices += 1;
            }
            "f" => {
                let mut face = Vec::new();
                for part in parts {
                    let global = resolve_face_index(part, global_vertices)
                        .ok_or_else(|| invalid(line_no, format!("invalid face index '{part}'")))?;
                    if global < object_start {
                        return Err(invalid(
                            line_no,
                            "face references a vertex from another object",
                        ));
                    }
                    face.push(global - object_start);
                }
                if face.len() < 3 {
                    return Err(invalid(line_no, "face needs at least three vertices"));
                }
                current_object(&mut objects, default_name).faces.push(face);
            }
            _ => {}
        }
    }

    Ok(objects)
}

fn current_object<'a>(objects: &'a mut Vec<MeshObject>, default_name: &str) -> &'a mut MeshObject {
    if objects.is_empty() {
        objects.push(MeshObject {
            name: default_name.to_string(),
            vertices: Vec::new(),
            faces: Vec::new(),
        });
    }
    let last = objects.len() - 1;
    &mut objects[last]
}

/// Zero-based global vertex index for an OBJ face reference such as `3`, `3/1/2` or `-1`.
fn resolve_face_index(part: &str, vertex_count: usize) -> Option<usize> {
    let index = part.split('/').next()?.parse::<i64>().ok()?;
    let resolved = if index > 0 {
        (index - 1) as usize
    } else if index < 0 {
        vertex_count.checked_sub(index.unsigned_abs() as usize)?
    } else {
        return None;
    };
    (resolved < vertex_count).then_some(resolved)
}

fn invalid(line_no: usize, message: impl Into<String>) -> ConvertError {
    ConvertError::InvalidModel {
        line: line_no + 1,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_obj, to_obj};
    use crate::convert::ConvertError;
    use crate::document::MeshObject;

    fn quad(name: &str, z: f64) -> MeshObject {
        MeshObject {
            name: name.to_string(),
            vertices: vec![
                [0.0, 0.0, z],
                [1.0, 0.0, z],
                [1.0, 1.0, z],
                [0.0, 1.0, z],
            ],
            faces: vec![vec![0, 1, 2, 3]],
        }
    }

    #[test]
    fn obj_contains_objects_vertices_and_faces() {
        let obj = to_obj(&[quad("Plane", 0.0)]);
        assert!(obj.starts_with("o Plane\n"));
        assert!(obj.contains("v 0 0 0"));
        assert!(obj.contains("v 1 1 0"));
        assert!(obj.contains("f 1 2 3 4"));
    }

    #[test]
    fn second_object_faces_are_offset() {
        let obj = to_obj(&[quad("A", 0.0), quad("B", 1.0)]);
        assert!(obj.contains("f 5 6 7 8"));
    }

    #[test]
    fn parsing_restores_object_local_indices() {
        let objects = vec![quad("A", 0.0), quad("B", 0.25)];
        let parsed = parse_obj(&to_obj(&objects), "model").expect("obj should parse");
        assert_eq!(parsed, objects);
    }

    #[test]
    fn parses_slash_and_negative_references() {
        let source = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1/1/1 2//2 -1\n";
        let parsed = parse_obj(source, "loose").expect("obj should parse");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "loose");
        assert_eq!(parsed[0].faces, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn out_of_range_face_is_rejected() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n", "bad").expect_err("dangling face");
        assert!(matches!(err, ConvertError::InvalidModel { line: 2, .. }));
    }
}
