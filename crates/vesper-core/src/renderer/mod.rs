// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! GPU resources, shader bindings and the native driver contracts.

pub mod binding;
pub mod error;
pub mod handle;
pub mod hardware;
pub mod native;
pub mod package;
pub mod resource;
pub mod settings;
pub mod shader;
pub mod traits;

pub use self::binding::{
    BindingId, BindingKind, ConstantBufferBinding, ResourceViewBinding, ShaderResourceBinding,
    TextureSamplerBinding, VertexInputBinding,
};
pub use self::error::{BindingError, CommandError, ResourceError, ShaderError};
pub use self::handle::{
    CommandListHandle, ContextHandle, DeviceHandle, ResourceHandle, SwapChainHandle, WindowHandle,
};
pub use self::hardware::{
    recommended_hardware, validate_selection, DisplayResolution, GraphicsAdapter, HardwareError,
    HardwareSelection, OutputDisplay,
};
pub use self::native::{NativeCallError, NativeCallResult, NativeResult};
pub use self::package::{PackageBinding, PackageValue, ShaderResourcePackage};
pub use self::resource::{
    BlendState, Buffer, BufferKind, DepthStencilState, DepthStencilView, GpuResource, InputLayout,
    RasterizerState, RenderTargetView, ShaderResourceView, Texture, TextureSampler, Viewport,
};
pub use self::settings::MsaaLevel;
pub use self::shader::{Shader, ShaderBinding, ShaderStage};
pub use self::traits::{DeviceInfo, GraphicsDriver};
