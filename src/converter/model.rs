// src/converter/model.rs

use crate::easyeda_models::Ee3dModel;
use crate::error::{Error, Result};
use crate::geometry::{MM_PER_UNIT, round_to};
use crate::kicad_models::Ki3dModel;
use glam::DVec3;
use std::collections::HashMap;
use std::fmt::Write;

/// OBJ payloads are in millimetres, VRML for KiCad in tenths of an inch
/// (ten EasyEDA units).
const MM_PER_VRML_UNIT: f64 = 10.0 * MM_PER_UNIT;

const VRML_HEADER: &str = "#VRML V2.0 utf8\n# 3D model generated by easyeda2kicad_rs\n";

#[derive(Debug, Clone)]
struct Material {
    diffuse: String,
    specular: String,
    transparency: String,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            diffuse: "0.5 0.5 0.5".to_string(),
            specular: "0 0 0".to_string(),
            transparency: "0".to_string(),
        }
    }
}

/// One `usemtl` section of the OBJ file.
#[derive(Debug, Default)]
struct ObjShape {
    material: String,
    faces: Vec<Vec<usize>>,
}

#[derive(Debug, Default)]
struct ObjMesh {
    vertices: Vec<DVec3>,
    materials: HashMap<String, Material>,
    shapes: Vec<ObjShape>,
}

fn parse_obj(obj_data: &str) -> Result<ObjMesh> {
    let mut mesh = ObjMesh::default();
    let mut current_material: Option<String> = None;

    for line in obj_data.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&keyword) = parts.first() else {
            continue;
        };
        match keyword {
            "newmtl" if parts.len() > 1 => {
                current_material = Some(parts[1].to_string());
                mesh.materials.insert(parts[1].to_string(), Material::default());
            }
            "Kd" | "Ks" | "d" => {
                let Some(material) = current_material
                    .as_ref()
                    .and_then(|name| mesh.materials.get_mut(name))
                else {
                    continue;
                };
                let value = parts[1..].join(" ");
                match keyword {
                    "Kd" => material.diffuse = value,
                    "Ks" => material.specular = value,
                    _ => material.transparency = value,
                }
            }
            "endmtl" => current_material = None,
            "v" if parts.len() >= 4 => {
                let coords: Vec<f64> = parts[1..4]
                    .iter()
                    .map(|p| p.parse::<f64>())
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| Error::ModelConversionError(format!("bad vertex {:?}: {}", line, e)))?;
                mesh.vertices.push(DVec3::new(coords[0], coords[1], coords[2]));
            }
            "usemtl" => mesh.shapes.push(ObjShape {
                material: parts[1..].join(""),
                faces: Vec::new(),
            }),
            "f" if parts.len() >= 4 => {
                // Format is f v1//vn1 v2//vn2 v3//vn3, 1-indexed
                let face = parts[1..]
                    .iter()
                    .map(|p| {
                        p.split('/')
                            .next()
                            .and_then(|index| index.parse::<usize>().ok())
                            .filter(|index| *index >= 1)
                            .ok_or_else(|| {
                                Error::ModelConversionError(format!("bad face {:?}", line))
                            })
                    })
                    .collect::<Result<Vec<usize>>>()?;
                if mesh.shapes.is_empty() {
                    mesh.shapes.push(ObjShape::default());
                }
                if let Some(shape) = mesh.shapes.last_mut() {
                    shape.faces.push(face);
                }
            }
            _ => {} // normals, groups and comments
        }
    }
    Ok(mesh)
}

fn format_coord(value: f64) -> String {
    let rounded = round_to(value / MM_PER_VRML_UNIT, 4);
    format!("{}", rounded)
}

/// Renders the OBJ mesh as VRML 2.0, one `Shape` per material section with
/// its own re-indexed coordinate list.
fn obj_to_wrl(obj_data: &str) -> Result<String> {
    let mesh = parse_obj(obj_data)?;
    let mut wrl = String::from(VRML_HEADER);

    for shape in &mesh.shapes {
        let material = mesh.materials.get(&shape.material).cloned().unwrap_or_default();

        let mut link: HashMap<usize, usize> = HashMap::new();
        let mut points: Vec<String> = Vec::new();
        let mut coord_index = String::new();
        for face in &shape.faces {
            for &index in face {
                let local = match link.get(&index) {
                    Some(&local) => local,
                    None => {
                        let vertex = mesh.vertices.get(index - 1).ok_or_else(|| {
                            Error::ModelConversionError(format!(
                                "face references vertex {} of {}",
                                index,
                                mesh.vertices.len()
                            ))
                        })?;
                        points.push(format!(
                            "{} {} {}",
                            format_coord(vertex.x),
                            format_coord(vertex.y),
                            format_coord(vertex.z)
                        ));
                        link.insert(index, points.len() - 1);
                        points.len() - 1
                    }
                };
                write!(&mut coord_index, "{},", local).unwrap();
            }
            coord_index.push_str("-1,");
        }

        writeln!(&mut wrl, "Shape {{").unwrap();
        writeln!(&mut wrl, "  appearance Appearance {{").unwrap();
        writeln!(&mut wrl, "    material Material {{").unwrap();
        writeln!(&mut wrl, "      diffuseColor {}", material.diffuse).unwrap();
        writeln!(&mut wrl, "      specularColor {}", material.specular).unwrap();
        writeln!(&mut wrl, "      ambientIntensity 0.2").unwrap();
        writeln!(&mut wrl, "      transparency {}", material.transparency).unwrap();
        writeln!(&mut wrl, "      shininess 0.5").unwrap();
        writeln!(&mut wrl, "    }}").unwrap();
        writeln!(&mut wrl, "  }}").unwrap();
        writeln!(&mut wrl, "  geometry IndexedFaceSet {{").unwrap();
        writeln!(&mut wrl, "    ccw TRUE").unwrap();
        writeln!(&mut wrl, "    solid FALSE").unwrap();
        writeln!(&mut wrl, "    coord DEF co Coordinate {{").unwrap();
        writeln!(&mut wrl, "      point [{}]", points.join(", ")).unwrap();
        writeln!(&mut wrl, "    }}").unwrap();
        writeln!(&mut wrl, "    coordIndex [{}]", coord_index).unwrap();
        writeln!(&mut wrl, "  }}").unwrap();
        writeln!(&mut wrl, "}}").unwrap();
    }

    Ok(wrl)
}

/// Converts an EasyEDA 3D model (with raw OBJ data) to a KiCad 3D model (WRL).
/// STEP bytes are passed through untouched. Placement is left neutral; the
/// footprint converter decides where the model sits.
pub fn convert_3d_model(mut ee_model: Ee3dModel) -> Result<Ki3dModel> {
    let wrl_data = match &ee_model.raw_obj {
        Some(obj_data) => Some(obj_to_wrl(obj_data)?),
        None => None,
    };

    Ok(Ki3dModel {
        name: ee_model.name,
        wrl_data,
        step_data: ee_model.step.take(),
        offset: DVec3::ZERO,
        scale: DVec3::ONE,
        rotate: DVec3::ZERO,
    })
}
