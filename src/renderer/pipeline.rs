use anyhow::{anyhow, Result};
use gfx_hal::{format as f, pass::Subpass, prelude::*, pso, Backend};
use std::borrow::Cow;
use std::io::Cursor;
use std::iter;
use std::mem::{self, ManuallyDrop};
use std::ptr;

const ENTRY_NAME: &str = "main";

const VERTEX_SPIRV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/flat.vert.spv"));
const FRAGMENT_SPIRV: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/flat.frag.spv"));

pub struct Pipeline<'a, B: Backend> {
    device: &'a B::Device,
    pub pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pub pipeline_layout: ManuallyDrop<B::PipelineLayout>,
}

impl<'a, B: Backend> Pipeline<'a, B> {
    /// Links the built-in flat shader pair for vertices of type `T`.
    ///
    /// `fill` is baked into the fragment stage through specialization
    /// constants 0..=2.
    pub fn new<T>(
        device: &'a B::Device,
        render_pass: &B::RenderPass,
        fill: [f32; 3],
    ) -> Result<Self> {
        let pipeline_layout = unsafe {
            device.create_pipeline_layout(
                iter::empty::<B::DescriptorSetLayout>(),
                &[] as &[(pso::ShaderStageFlags, std::ops::Range<u32>)],
            )
        }
        .map_err(|err| anyhow!("failed to create pipeline layout: {:?}", err))?;
        let pipeline_layout = ManuallyDrop::new(pipeline_layout);

        let modules = Self::load_spirv(device, VERTEX_SPIRV).and_then(|vs_module| {
            match Self::load_spirv(device, FRAGMENT_SPIRV) {
                Ok(fs_module) => Ok((vs_module, fs_module)),
                Err(err) => {
                    unsafe { device.destroy_shader_module(vs_module) };
                    Err(err)
                }
            }
        });
        let (vs_module, fs_module) = match modules {
            Ok(modules) => modules,
            Err(err) => {
                unsafe {
                    device.destroy_pipeline_layout(ManuallyDrop::into_inner(pipeline_layout))
                };
                return Err(err);
            }
        };

        let graphic_pipeline = {
            let (vs_entry, fs_entry) = (
                pso::EntryPoint {
                    entry: ENTRY_NAME,
                    module: &vs_module,
                    specialization: pso::Specialization::default(),
                },
                pso::EntryPoint {
                    entry: ENTRY_NAME,
                    module: &fs_module,
                    specialization: fill_specialization(fill),
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
                main_pass: &*render_pass,
            };

            let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
                shader_entries,
                pso::Primitive::TriangleList,
                pso::Rasterizer::FILL,
                &*pipeline_layout,
                subpass,
            );
            pipeline_desc.blender.targets.push(pso::ColorBlendDesc {
                mask: pso::ColorMask::ALL,
                blend: None,
            });

            pipeline_desc.vertex_buffers.push(pso::VertexBufferDesc {
                binding: 0,
                stride: mem::size_of::<T>() as u32,
                rate: pso::VertexInputRate::Vertex,
            });

            pipeline_desc.attributes.push(pso::AttributeDesc {
                location: 0,
                binding: 0,
                element: pso::Element {
                    format: f::Format::Rgb32Sfloat,
                    offset: 0,
                },
            });

            unsafe { device.create_graphics_pipeline(&pipeline_desc, None) }
        };

        // modules are no longer needed once linked
        unsafe {
            device.destroy_shader_module(vs_module);
            device.destroy_shader_module(fs_module);
        }

        let graphic_pipeline = match graphic_pipeline {
            Ok(pipeline) => pipeline,
            Err(err) => {
                unsafe {
                    device.destroy_pipeline_layout(ManuallyDrop::into_inner(pipeline_layout))
                };
                return Err(anyhow!("failed to create graphics pipeline: {:?}", err));
            }
        };

        Ok(Pipeline {
            device,
            pipeline: ManuallyDrop::new(graphic_pipeline),
            pipeline_layout,
        })
    }

    fn load_spirv(device: &B::Device, bytes: &[u8]) -> Result<B::ShaderModule> {
        let spirv = pso::read_spirv(Cursor::new(bytes))
            .map_err(|err| anyhow!("malformed SPIR-V: {}", err))?;
        unsafe { device.create_shader_module(&spirv) }
            .map_err(|err| anyhow!("failed to create shader module: {:?}", err))
    }
}

fn fill_specialization(fill: [f32; 3]) -> pso::Specialization<'static> {
    let constants = (0..fill.len())
        .map(|i| pso::SpecializationConstant {
            id: i as u32,
            range: (i * 4) as u16..(i * 4 + 4) as u16,
        })
        .collect::<Vec<_>>();
    let data = fill
        .iter()
        .flat_map(|channel| channel.to_ne_bytes().to_vec())
        .collect::<Vec<u8>>();

    pso::Specialization {
        constants: Cow::Owned(constants),
        data: Cow::Owned(data),
    }
}

impl<'a, B: Backend> Drop for Pipeline<'a, B> {
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
