use gfx_hal::{format as f, pso};
use std::mem;

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
}

// x right, y up, z out of the screen
pub const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, 0.5, 0.0],
    },
    Vertex {
        position: [-0.5, -0.5, 0.0],
    },
    Vertex {
        position: [0.5, -0.5, 0.0],
    },
];

impl Vertex {
    pub const BINDING: pso::BufferIndex = 0;

    pub fn buffer_desc() -> pso::VertexBufferDesc {
        pso::VertexBufferDesc {
            binding: Self::BINDING,
            stride: mem::size_of::<Vertex>() as u32,
            rate: pso::VertexInputRate::Vertex,
        }
    }

    /// Matches `layout(location = 0) in vec3 a_position` in `triangle.vert`.
    pub fn attributes() -> [pso::AttributeDesc; 1] {
        [pso::AttributeDesc {
            location: 0,
            binding: Self::BINDING,
            element: pso::Element {
                format: f::Format::Rgb32Sfloat,
                offset: 0,
            },
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_is_nine_packed_floats() {
        assert_eq!(mem::size_of::<Vertex>(), 3 * mem::size_of::<f32>());
        assert_eq!(mem::size_of_val(&TRIANGLE), 9 * mem::size_of::<f32>());

        let flat: Vec<f32> = TRIANGLE.iter().flat_map(|v| v.position.to_vec()).collect();
        assert_eq!(
            flat,
            vec![0.0, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0]
        );
    }

    #[test]
    fn layout_covers_the_whole_vertex() {
        let desc = Vertex::buffer_desc();
        assert_eq!(desc.stride as usize, mem::size_of::<Vertex>());
        assert_eq!(desc.binding, Vertex::BINDING);

        let [position] = Vertex::attributes();
        assert_eq!(position.location, 0);
        assert_eq!(position.binding, desc.binding);
        assert_eq!(position.element.offset, 0);
        assert_eq!(position.element.format, f::Format::Rgb32Sfloat);
    }
}
