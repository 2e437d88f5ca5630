use crate::cut_info::{CutInfo, ElementType};
use crate::deformation::MeshDeformation;
use crate::error::CutFemError;
use crate::levelset::LevelSetField;
use crate::mask::ElementSet;
use crate::mesh::TriangleMesh2d;
use crate::space::LagrangeSpace;
use crate::util::to_f64;
use crate::Real;
use nalgebra::DVector;
use std::convert::TryInto;
use std::path::Path;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataArray, DataSet, ElementType as VtkElementType, Piece,
    UnstructuredGridPiece, Version, VertexNumbers, Vtk,
};

fn scalar_attribute(name: impl Into<String>, values: Vec<f64>) -> Attribute {
    Attribute::DataArray(DataArray {
        name: name.into(),
        elem: VtkElementType::Scalars {
            num_comp: 1,
            lookup_table: None,
        },
        data: values.into(),
    })
}

/// Numeric code of an element classification in exported cell data.
pub fn element_type_code(element_type: ElementType) -> f64 {
    match element_type {
        ElementType::Neg => -1.0,
        ElementType::Cut => 0.0,
        ElementType::Pos => 1.0,
    }
}

/// Builds a VTK unstructured grid of the background mesh, optionally displaced by a mesh
/// deformation, with point fields (level set, solutions) and cell fields (classification,
/// cut ratio, activity).
///
/// Higher-order fields are exported through their vertex values.
pub struct CutMeshDataSetBuilder<'a, T: Real> {
    mesh: &'a TriangleMesh2d<T>,
    deformation: Option<&'a MeshDeformation<T>>,
    point_attributes: Vec<Attribute>,
    cell_attributes: Vec<Attribute>,

    // Only used for exporting directly to file
    title: Option<String>,
}

impl<'a, T: Real> CutMeshDataSetBuilder<'a, T> {
    pub fn from_mesh(mesh: &'a TriangleMesh2d<T>) -> Self {
        Self {
            mesh,
            deformation: None,
            point_attributes: Vec::new(),
            cell_attributes: Vec::new(),
            title: None,
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    /// Exports the vertices at their deformed positions.
    pub fn with_deformation(self, deformation: &'a MeshDeformation<T>) -> Result<Self, CutFemError> {
        if deformation.mesh_generation() != self.mesh.generation() {
            return Err(CutFemError::configuration(
                "deformation was computed for a different mesh topology",
            ));
        }
        Ok(Self {
            deformation: Some(deformation),
            ..self
        })
    }

    fn check_len(&self, what: &str, actual: usize, expected: usize) -> Result<(), CutFemError> {
        if actual == expected {
            Ok(())
        } else {
            Err(CutFemError::configuration(format!(
                "{} has {} values, expected {}",
                what, actual, expected
            )))
        }
    }

    /// Adds a scalar field with one value per mesh vertex.
    pub fn with_point_scalars(mut self, name: impl Into<String>, values: &[T]) -> Result<Self, CutFemError> {
        let name = name.into();
        self.check_len(&name, values.len(), self.mesh.num_vertices())?;
        let values = values.iter().copied().map(to_f64).collect();
        self.point_attributes.push(scalar_attribute(name, values));
        Ok(self)
    }

    /// Adds a scalar field with one value per element.
    pub fn with_cell_scalars(mut self, name: impl Into<String>, values: &[T]) -> Result<Self, CutFemError> {
        let name = name.into();
        self.check_len(&name, values.len(), self.mesh.num_elements())?;
        let values = values.iter().copied().map(to_f64).collect();
        self.cell_attributes.push(scalar_attribute(name, values));
        Ok(self)
    }

    /// Adds the nodal values of a level-set field as the point field `levelset`.
    pub fn with_levelset(self, levelset: &LevelSetField<T>) -> Result<Self, CutFemError> {
        levelset.check_mesh(self.mesh)?;
        self.with_point_scalars("levelset", levelset.values())
    }

    /// Adds the vertex values of a finite element function.
    pub fn with_solution(
        self,
        name: impl Into<String>,
        space: &LagrangeSpace,
        coefficients: &DVector<T>,
    ) -> Result<Self, CutFemError> {
        space.check_mesh(self.mesh)?;
        let name = name.into();
        self.check_len(&name, coefficients.len(), space.num_dofs())?;
        // Vertex dofs come first
        let num_vertices = self.mesh.num_vertices();
        self.with_point_scalars(name, &coefficients.as_slice()[..num_vertices])
    }

    /// Adds the cell fields `element_type` (`-1` negative, `0` cut, `1` positive) and
    /// `cut_ratio`.
    pub fn with_cut_info(mut self, cut_info: &CutInfo<T>) -> Result<Self, CutFemError> {
        cut_info.check_mesh(self.mesh)?;
        let types = cut_info
            .element_types()
            .iter()
            .copied()
            .map(element_type_code)
            .collect();
        self.cell_attributes.push(scalar_attribute("element_type", types));
        self.with_cell_scalars("cut_ratio", cut_info.cut_ratios())
    }

    /// Adds an element set as a `0`/`1` cell field.
    pub fn with_element_set(mut self, name: impl Into<String>, elements: &ElementSet) -> Result<Self, CutFemError> {
        let name = name.into();
        self.check_len(&name, elements.len(), self.mesh.num_elements())?;
        let values = elements
            .as_slice()
            .iter()
            .map(|&active| if active { 1.0 } else { 0.0 })
            .collect();
        self.cell_attributes.push(scalar_attribute(name, values));
        Ok(self)
    }

    pub fn try_build(&self) -> eyre::Result<DataSet> {
        let displacements = self.deformation.map(|d| d.vertex_displacements(self.mesh));
        let mut points = Vec::with_capacity(3 * self.mesh.num_vertices());
        for (i, v) in self.mesh.vertices().iter().enumerate() {
            let x = match displacements {
                Some(displacements) => v + displacements[i],
                None => *v,
            };
            points.extend_from_slice(&[to_f64(x.x), to_f64(x.y), 0.0]);
        }

        // Vertices is laid out as follows: N, i_1, i_2, ... i_N
        let mut vertices: Vec<u32> = Vec::with_capacity(4 * self.mesh.num_elements());
        for cell in self.mesh.connectivity() {
            vertices.push(3);
            for &idx in &cell.0 {
                vertices.push(idx.try_into()?);
            }
        }

        let piece = UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: self.mesh.num_elements().try_into()?,
                    vertices,
                },
                types: vec![CellType::Triangle; self.mesh.num_elements()],
            },
            data: Attributes {
                point: self.point_attributes.clone(),
                cell: self.cell_attributes.clone(),
            },
        };

        Ok(DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        })
    }

    /// Convenience function for directly exporting the dataset to a legacy VTK file.
    pub fn try_export(&self, filename: impl AsRef<Path>) -> eyre::Result<()> {
        let filepath = filename.as_ref();
        let fallback_title = filepath
            .file_stem()
            .map(|os_str| os_str.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let dataset = self.try_build()?;
        Vtk {
            version: Version { major: 4, minor: 1 },
            // If we don't have a title then just make the filepath the title
            title: self.title.clone().unwrap_or(fallback_title),
            byte_order: ByteOrder::BigEndian,
            data: dataset,
            file_path: None,
        }
        .export(filepath)
        .map_err(|err| eyre::eyre!("failed to export {}: {:?}", filepath.display(), err))?;
        Ok(())
    }
}
