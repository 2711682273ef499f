//! Lua embedding: script state construction, the sketch class prelude and the
//! drawing-surface binding seam

use crate::error::{CompilerError, Result};
use crate::CompilerConfig;
use mlua::{
    AnyUserData, Function, Lua, LuaOptions, RegistryKey, StdLib, Table, UserData, UserDataFields,
    UserDataMethods, Value,
};
use std::path::Path;

/// Chunk name of the host prelude. Deliberately not a `.lua` path so stack
/// frames inside it are never mistaken for generated-file frames.
const PRELUDE_CHUNK: &str = "@[sketch-prelude]";

/// Host-installed support library.
///
/// `sketch.declare(name)` is create-or-fetch, giving every generated file of
/// one sketch the same class table (the partial-class equivalent). Each class
/// owns an environment table routing bare-name reads through the bound
/// instance, then the class, then the drawing API, then real globals; writes
/// go to the instance once one is bound, to the class before that.
const PRELUDE: &str = r#"
local registry = { classes = {}, order = {}, frame_count = 0 }

local Sketch = {}
Sketch.__name = "Sketch"
Sketch.frame_rate = 0
Sketch.real_time = 0
function Sketch.setup() end
function Sketch.draw() end

local api = {}

local function surface()
    local s = registry.surface
    if s == nil then
        error("no drawing surface bound", 2)
    end
    return s
end

function api.size(w, h) surface():size(w, h) end
function api.background(r, g, b) surface():background(r, g, b) end
function api.stroke(r, g, b) surface():stroke(r, g, b) end
function api.fill(r, g, b) surface():fill(r, g, b) end
function api.line(x1, y1, x2, y2) surface():line(x1, y1, x2, y2) end
function api.rect(x, y, w, h) surface():rect(x, y, w, h) end
function api.ellipse(x, y, w, h) surface():ellipse(x, y, w, h) end
function api.circle(x, y, d) surface():ellipse(x, y, d, d) end
function api.point(x, y) surface():point(x, y) end
function api.width() return surface().width end
function api.height() return surface().height end
function api.frame_count() return registry.frame_count end

local sketch = {}

function sketch.declare(name)
    local class = registry.classes[name]
    if class ~= nil then
        return class, class.__env
    end
    class = { __name = name, __base = Sketch }
    setmetatable(class, { __index = Sketch })
    local env = {}
    rawset(class, "__env", env)
    setmetatable(env, {
        __index = function(_, key)
            local inst = rawget(env, "__self")
            if inst ~= nil then
                local v = rawget(inst, key)
                if v ~= nil then return v end
            end
            local v = class[key]
            if v ~= nil then return v end
            v = api[key]
            if v ~= nil then return v end
            return _G[key]
        end,
        __newindex = function(_, key, value)
            local inst = rawget(env, "__self")
            if inst ~= nil then
                rawset(inst, key, value)
            else
                rawset(class, key, value)
            end
        end,
    })
    registry.classes[name] = class
    registry.order[#registry.order + 1] = name
    return class, env
end

function sketch.bind(class, instance)
    rawset(class.__env, "__self", instance)
end

return { sketch = sketch, registry = registry, base = Sketch }
"#;

/// One recorded drawing call. The real application hands these to a raster
/// surface; tests inspect them directly.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Size { w: f64, h: f64 },
    Background { r: f64, g: f64, b: f64 },
    Stroke { r: f64, g: f64, b: f64 },
    Fill { r: f64, g: f64, b: f64 },
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },
    Rect { x: f64, y: f64, w: f64, h: f64 },
    Ellipse { x: f64, y: f64, w: f64, h: f64 },
    Point { x: f64, y: f64 },
}

/// The mutable drawing context handed to the script before each `draw()`.
///
/// This is the seam to the real rendering surface; only a representative
/// subset of the drawing API exists here. Color-mode and paint state live on
/// this value, not in globals, so a fresh surface starts from a clean slate
/// with no reset hook.
#[derive(Debug, Clone)]
pub struct Surface {
    pub width: f64,
    pub height: f64,
    pub ops: Vec<DrawOp>,
}

impl Default for Surface {
    fn default() -> Self {
        Self { width: 100.0, height: 100.0, ops: Vec::new() }
    }
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserData for Surface {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("width", |_, this| Ok(this.width));
        fields.add_field_method_get("height", |_, this| Ok(this.height));
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method_mut("size", |_, this, (w, h): (f64, f64)| {
            this.width = w;
            this.height = h;
            this.ops.push(DrawOp::Size { w, h });
            Ok(())
        });
        methods.add_method_mut("background", |_, this, (r, g, b): (f64, f64, f64)| {
            this.ops.push(DrawOp::Background { r, g, b });
            Ok(())
        });
        methods.add_method_mut("stroke", |_, this, (r, g, b): (f64, f64, f64)| {
            this.ops.push(DrawOp::Stroke { r, g, b });
            Ok(())
        });
        methods.add_method_mut("fill", |_, this, (r, g, b): (f64, f64, f64)| {
            this.ops.push(DrawOp::Fill { r, g, b });
            Ok(())
        });
        methods.add_method_mut("line", |_, this, (x1, y1, x2, y2): (f64, f64, f64, f64)| {
            this.ops.push(DrawOp::Line { x1, y1, x2, y2 });
            Ok(())
        });
        methods.add_method_mut("rect", |_, this, (x, y, w, h): (f64, f64, f64, f64)| {
            this.ops.push(DrawOp::Rect { x, y, w, h });
            Ok(())
        });
        methods.add_method_mut("ellipse", |_, this, (x, y, w, h): (f64, f64, f64, f64)| {
            this.ops.push(DrawOp::Ellipse { x, y, w, h });
            Ok(())
        });
        methods.add_method_mut("point", |_, this, (x, y): (f64, f64)| {
            this.ops.push(DrawOp::Point { x, y });
            Ok(())
        });
    }
}

/// Owns the Lua state for one compile cycle and the registry handles into the
/// prelude. Consumed by the type loader on success.
pub struct ScriptHost {
    lua: Lua,
    registry: RegistryKey,
    base: RegistryKey,
}

impl ScriptHost {
    /// Build a fresh state: open the configured standard libraries, install
    /// the prelude, run companion local libraries and extra usings.
    pub fn new(config: &CompilerConfig) -> Result<Self> {
        let mut libs = StdLib::NONE;
        for name in &config.system_libraries {
            libs |= stdlib_flag(name)?;
        }
        let lua = Lua::new_with(libs, LuaOptions::default())
            .map_err(|e| CompilerError::script(format!("state init: {}", e)))?;

        let (registry, base) = {
            let exports: Table = lua
                .load(PRELUDE)
                .set_name(PRELUDE_CHUNK)
                .eval()
                .map_err(|e| CompilerError::script(format!("prelude: {}", e)))?;
            let sketch: Table = exports.get("sketch")?;
            let registry: Table = exports.get("registry")?;
            let base: Table = exports.get("base")?;
            lua.globals().set("sketch", sketch)?;
            (lua.create_registry_value(registry)?, lua.create_registry_value(base)?)
        };

        let host = Self { lua, registry, base };
        host.load_local_libraries(config)?;
        host.load_extra_usings(config)?;
        Ok(host)
    }

    fn load_local_libraries(&self, config: &CompilerConfig) -> Result<()> {
        for path in &config.local_libraries {
            let source = std::fs::read_to_string(path).map_err(|e| {
                CompilerError::FileNotFound { path: format!("{}: {}", path.display(), e) }
            })?;
            log::debug!("loading local library {}", path.display());
            self.lua
                .load(&source)
                .set_name(format!("@{}", path.display()))
                .exec()
                .map_err(|e| {
                    CompilerError::script(format!("local library {}: {}", path.display(), e))
                })?;
        }
        Ok(())
    }

    fn load_extra_usings(&self, config: &CompilerConfig) -> Result<()> {
        if config.extra_usings.is_empty() {
            return Ok(());
        }
        let require: Option<Function> = self.lua.globals().get("require")?;
        let require = require.ok_or_else(|| CompilerError::InvalidFormat {
            message: "extra usings need the \"package\" system library".to_string(),
        })?;
        for name in &config.extra_usings {
            let module: Value = require
                .call(name.as_str())
                .map_err(|e| CompilerError::script(format!("using {}: {}", name, e)))?;
            self.lua.globals().set(name.as_str(), module)?;
        }
        Ok(())
    }

    /// Compile one generated file's text into a callable chunk. The chunk
    /// name points at the written temp file, so every diagnostic and stack
    /// frame produced from it carries that path.
    pub fn compile_chunk<'lua>(
        &'lua self,
        source: &str,
        path: &Path,
    ) -> mlua::Result<Function<'lua>> {
        self.lua
            .load(source)
            .set_name(format!("@{}", path.display()))
            .into_function()
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    pub(crate) fn registry_table(&self) -> mlua::Result<Table<'_>> {
        self.lua.registry_value(&self.registry)
    }

    pub(crate) fn base_table(&self) -> mlua::Result<Table<'_>> {
        self.lua.registry_value(&self.base)
    }

    pub(crate) fn create_surface(&self, surface: Surface) -> mlua::Result<AnyUserData<'_>> {
        self.lua.create_userdata(surface)
    }
}

fn stdlib_flag(name: &str) -> Result<StdLib> {
    let flag = match name {
        // LuaJIT bundles coroutines into the always-open base library, so
        // mlua has no separate COROUTINE flag for it; accepting the name as
        // a no-op keeps the functions available.
        "coroutine" => StdLib::NONE,
        "table" => StdLib::TABLE,
        "io" => StdLib::IO,
        "os" => StdLib::OS,
        "string" => StdLib::STRING,
        "math" => StdLib::MATH,
        "package" => StdLib::PACKAGE,
        "bit" => StdLib::BIT,
        "jit" => StdLib::JIT,
        other => {
            return Err(CompilerError::InvalidFormat {
                message: format!("unknown system library \"{}\"", other),
            })
        }
    };
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ScriptHost {
        ScriptHost::new(&CompilerConfig::default()).unwrap()
    }

    #[test]
    fn prelude_installs_sketch_global() {
        let host = host();
        let sketch: Table = host.lua().globals().get("sketch").unwrap();
        let _declare: Function = sketch.get("declare").unwrap();
    }

    #[test]
    fn declare_is_create_or_fetch() {
        let host = host();
        host.lua()
            .load("a = sketch.declare(\"S\"); b = sketch.declare(\"S\")")
            .exec()
            .unwrap();
        let same: bool = host.lua().load("return rawequal(a, b)").eval().unwrap();
        assert!(same);

        let registry = host.registry_table().unwrap();
        let order: Table = registry.get("order").unwrap();
        assert_eq!(order.len().unwrap(), 1);
    }

    #[test]
    fn surface_records_draw_ops() {
        let host = host();
        let ud = host.create_surface(Surface::new()).unwrap();
        host.registry_table().unwrap().set("surface", ud.clone()).unwrap();
        host.lua()
            .load("local s = sketch.declare(\"S\"); s.__env.line(0, 0, 10, 10)")
            .exec()
            .unwrap();
        let surface = ud.borrow::<Surface>().unwrap();
        assert_eq!(surface.ops, vec![DrawOp::Line { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 }]);
    }

    #[test]
    fn drawing_without_surface_raises() {
        let host = host();
        let err = host
            .lua()
            .load("local s = sketch.declare(\"S\"); s.__env.point(1, 1)")
            .exec()
            .unwrap_err();
        assert!(err.to_string().contains("no drawing surface bound"));
    }

    #[test]
    fn unknown_system_library_is_rejected() {
        let mut config = CompilerConfig::default();
        config.system_libraries.push("graphics".to_string());
        assert!(ScriptHost::new(&config).is_err());
    }

    #[test]
    fn env_writes_go_to_class_then_instance() {
        let host = host();
        host.lua()
            .load(
                r#"
                local class, env = sketch.declare("S")
                env.x = 1
                inst = setmetatable({}, { __index = class })
                sketch.bind(class, inst)
                env.y = 2
                got_x = env.x
                "#,
            )
            .exec()
            .unwrap();
        let globals = host.lua().globals();
        let inst: Table = globals.get("inst").unwrap();
        // y landed on the instance, x stayed on the class but reads through.
        assert_eq!(inst.raw_get::<_, Option<f64>>("y").unwrap(), Some(2.0));
        assert_eq!(inst.raw_get::<_, Option<f64>>("x").unwrap(), None);
        assert_eq!(globals.get::<_, f64>("got_x").unwrap(), 1.0);
    }
}
