use gfx_hal::{format as f, pass::Subpass, prelude::*, pso, Backend};
use std::io::Cursor;
use std::iter;
use std::mem::{self, ManuallyDrop};
use std::ops::Range;
use std::ptr;
use std::rc::Rc;

use super::describe;
use crate::error::Error;
use crate::vertex::Fvf;

const ENTRY_NAME: &str = "main";

const VERTEX_SHADER: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/pretransformed.vert.spv"));
const FRAGMENT_SHADER: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/pretransformed.frag.spv"));

/// Bytes of push constants: the viewport width and height.
pub const VIEWPORT_CONSTANTS: Range<u32> = 0..2 * mem::size_of::<f32>() as u32;

/// Fixed-function stand-in for transformed and lit vertices.
pub struct Pipeline<B: Backend> {
    device: Rc<B::Device>,
    pub fvf: Fvf,
    pub pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pub pipeline_layout: ManuallyDrop<B::PipelineLayout>,
}

impl<B: Backend> Pipeline<B> {
    pub fn new(device: Rc<B::Device>, render_pass: &B::RenderPass, fvf: Fvf) -> Result<Self, Error> {
        if !fvf.contains(Fvf::XYZRHW) || !fvf.contains(Fvf::DIFFUSE) {
            return Err(Error::UnsupportedFormat(fvf));
        }

        let pipeline_layout = unsafe {
            device.create_pipeline_layout(
                iter::empty::<B::DescriptorSetLayout>(),
                &[(pso::ShaderStageFlags::VERTEX, VIEWPORT_CONSTANTS)],
            )
        }
        .map_err(|err| Error::CreateDevice(describe(err)))?;

        let graphic_pipeline = Self::create_graphics_pipeline(&device, render_pass, &pipeline_layout, fvf);
        let graphic_pipeline = match graphic_pipeline {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout) };
                return Err(err);
            }
        };

        Ok(Pipeline {
            device,
            fvf,
            pipeline: ManuallyDrop::new(graphic_pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
        })
    }

    fn create_graphics_pipeline(
        device: &B::Device,
        render_pass: &B::RenderPass,
        pipeline_layout: &B::PipelineLayout,
        fvf: Fvf,
    ) -> Result<B::GraphicsPipeline, Error> {
        let vs_module = Self::load_spirv(device, VERTEX_SHADER)?;
        let fs_module = match Self::load_spirv(device, FRAGMENT_SHADER) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vs_module) };
                return Err(err);
            }
        };

        let (vs_entry, fs_entry) = (
            pso::EntryPoint {
                entry: ENTRY_NAME,
                module: &vs_module,
                specialization: pso::Specialization::default(),
            },
            pso::EntryPoint {
                entry: ENTRY_NAME,
                module: &fs_module,
                specialization: pso::Specialization::default(),
            },
        );

        let shader_entries = pso::GraphicsShaderSet {
            vertex: vs_entry,
            hull: None,
            domain: None,
            geometry: None,
            fragment: Some(fs_entry),
        };

        let subpass = Subpass {
            index: 0,
            main_pass: render_pass,
        };

        let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
            shader_entries,
            pso::Primitive::TriangleList,
            pso::Rasterizer::FILL,
            pipeline_layout,
            subpass,
        );
        pipeline_desc.blender.targets.push(pso::ColorBlendDesc {
            mask: pso::ColorMask::ALL,
            blend: None,
        });

        pipeline_desc.vertex_buffers.push(pso::VertexBufferDesc {
            binding: 0,
            stride: fvf.vertex_size(),
            rate: pso::VertexInputRate::Vertex,
        });

        // x, y, z, rhw
        pipeline_desc.attributes.push(pso::AttributeDesc {
            location: 0,
            binding: 0,
            element: pso::Element {
                format: f::Format::Rgba32Sfloat,
                offset: 0,
            },
        });
        // ARGB as little-endian bytes, swizzled back in the vertex shader
        pipeline_desc.attributes.push(pso::AttributeDesc {
            location: 1,
            binding: 0,
            element: pso::Element {
                format: f::Format::Rgba8Unorm,
                offset: Fvf::XYZRHW.vertex_size(),
            },
        });

        let graphic_pipeline = unsafe { device.create_graphics_pipeline(&pipeline_desc, None) }
            .map_err(|err| Error::CreateDevice(describe(err)));

        unsafe {
            device.destroy_shader_module(vs_module);
            device.destroy_shader_module(fs_module);
        }

        graphic_pipeline
    }

    fn load_spirv(device: &B::Device, bytes: &[u8]) -> Result<B::ShaderModule, Error> {
        let spirv = pso::read_spirv(Cursor::new(bytes))
            .map_err(|err| Error::CreateDevice(format!("invalid SPIR-V: {}", err)))?;
        unsafe { device.create_shader_module(&spirv) }
            .map_err(|err| Error::CreateDevice(describe(err)))
    }
}

impl<B: Backend> Drop for Pipeline<B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_graphics_pipeline(ManuallyDrop::into_inner(ptr::read(&self.pipeline)));
            self.device
                .destroy_pipeline_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_layout,
                )));
        }
    }
}
