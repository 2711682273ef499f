//! Type loader: scans the class registry of a freshly executed module set,
//! instantiates the one sketch class and wraps it for the host

use crate::error::Result;
use crate::runtime::{DrawOp, ScriptHost, Surface};
use mlua::{AnyUserData, Function, RegistryKey, Table, Value};

/// Outcome of scanning the emitted classes for a sketch.
pub enum LoadOutcome {
    Loaded(ScriptInstance),
    /// No class has the Sketch base. Not fatal; a file set may define only
    /// helpers.
    NoneFound,
    /// More than one candidate; ambiguous, nothing is instantiated.
    Multiple(Vec<String>),
    /// The zero-argument constructor raised.
    ConstructorFailed(mlua::Error),
}

/// Select the one class whose direct base *is* the Sketch base table (pointer
/// identity, not a name comparison) and construct it via its zero-argument
/// `new()`.
pub fn load_script(host: ScriptHost) -> Result<LoadOutcome> {
    let loaded = {
        let registry = host.registry_table()?;
        let base = host.base_table()?;
        let order: Table = registry.get("order")?;
        let classes: Table = registry.get("classes")?;

        let mut candidates: Vec<String> = Vec::new();
        for name in order.sequence_values::<String>() {
            let name = name?;
            let class: Table = classes.get(name.as_str())?;
            if let Value::Table(class_base) = class.raw_get::<_, Value>("__base")? {
                if class_base.to_pointer() == base.to_pointer() {
                    candidates.push(name);
                }
            }
        }

        log::debug!("sketch candidates: {:?}", candidates);
        if candidates.is_empty() {
            return Ok(LoadOutcome::NoneFound);
        }
        if candidates.len() > 1 {
            return Ok(LoadOutcome::Multiple(candidates));
        }

        let class_name = candidates.remove(0);
        let class: Table = classes.get(class_name.as_str())?;
        let constructor: Function = match class.get("new") {
            Ok(f) => f,
            Err(e) => return Ok(LoadOutcome::ConstructorFailed(e)),
        };
        let instance: Table = match constructor.call(()) {
            Ok(t) => t,
            Err(e) => return Ok(LoadOutcome::ConstructorFailed(e)),
        };
        (host.lua().create_registry_value(instance)?, class_name)
    };

    let (instance, class_name) = loaded;
    Ok(LoadOutcome::Loaded(ScriptInstance { host, instance, surface: None, class_name }))
}

/// The live sketch object for one session. Owns the whole Lua state; dropped
/// and rebuilt wholesale on every successful recompile.
///
/// Runtime errors from `setup`/`draw` come back as [`mlua::Error`]; their
/// messages carry generated-file positions the caller feeds through the
/// runtime remapper.
pub struct ScriptInstance {
    host: ScriptHost,
    instance: RegistryKey,
    surface: Option<RegistryKey>,
    class_name: String,
}

impl ScriptInstance {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    fn table(&self) -> mlua::Result<Table<'_>> {
        self.host.lua().registry_value(&self.instance)
    }

    /// Invoked once after construction.
    pub fn setup(&self) -> mlua::Result<()> {
        self.call_entry("setup")
    }

    /// Invoked once per frame tick.
    pub fn draw(&self) -> mlua::Result<()> {
        self.call_entry("draw")
    }

    fn call_entry(&self, name: &str) -> mlua::Result<()> {
        let function: Function = self.table()?.get(name)?;
        function.call(())
    }

    /// Host -> script, set before each tick.
    pub fn set_real_time(&self, seconds: f64) -> mlua::Result<()> {
        self.table()?.raw_set("real_time", seconds)
    }

    /// Script -> host; the host retunes its tick timer from this.
    pub fn frame_rate(&self) -> mlua::Result<u32> {
        let value: Option<f64> = self.table()?.get("frame_rate")?;
        Ok(value.unwrap_or(0.0).max(0.0) as u32)
    }

    pub fn set_frame_rate(&self, fps: u32) -> mlua::Result<()> {
        self.table()?.raw_set("frame_rate", fps)
    }

    /// Install the drawing context the next `draw()` will render into.
    pub fn bind_surface(&mut self, surface: Surface) -> mlua::Result<()> {
        let ud = self.host.create_surface(surface)?;
        self.host.registry_table()?.set("surface", ud.clone())?;
        self.surface = Some(self.host.lua().create_registry_value(ud)?);
        Ok(())
    }

    /// Snapshot of the ops recorded on the bound surface.
    pub fn surface_ops(&self) -> mlua::Result<Vec<DrawOp>> {
        match &self.surface {
            Some(key) => {
                let ud: AnyUserData = self.host.lua().registry_value(key)?;
                let surface = ud.borrow::<Surface>()?;
                Ok(surface.ops.clone())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Detach and return the bound surface, if any.
    pub fn take_surface(&mut self) -> mlua::Result<Option<Surface>> {
        let Some(key) = self.surface.take() else {
            return Ok(None);
        };
        let ud: AnyUserData = self.host.lua().registry_value(&key)?;
        let snapshot = ud.borrow::<Surface>()?.clone();
        self.host.registry_table()?.set("surface", Value::Nil)?;
        Ok(Some(snapshot))
    }

    /// Advance the frame counter the script reads via `frame_count()`.
    pub fn frame_advanced(&self) -> mlua::Result<()> {
        let registry = self.host.registry_table()?;
        let count: f64 = registry.get("frame_count")?;
        registry.set("frame_count", count + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompilerConfig;

    fn host_with(chunks: &[&str]) -> ScriptHost {
        let host = ScriptHost::new(&CompilerConfig::default()).unwrap();
        for chunk in chunks {
            host.lua().load(*chunk).exec().unwrap();
        }
        host
    }

    const WRAPPER: &str = r#"
        local class, env = sketch.declare("Main")
        function class.new()
            local self = setmetatable({}, { __index = class })
            sketch.bind(class, self)
            return self
        end
    "#;

    #[test]
    fn zero_candidates_is_none_found() {
        let host = host_with(&[]);
        assert!(matches!(load_script(host).unwrap(), LoadOutcome::NoneFound));
    }

    #[test]
    fn multiple_candidates_reported_with_names() {
        let host = host_with(&["sketch.declare(\"A\")", "sketch.declare(\"B\")"]);
        match load_script(host).unwrap() {
            LoadOutcome::Multiple(names) => assert_eq!(names, vec!["A", "B"]),
            _ => panic!("expected Multiple"),
        }
    }

    #[test]
    fn constructor_error_is_surfaced() {
        let host = host_with(&[
            "local c = sketch.declare(\"Main\"); function c.new() error(\"ctor boom\") end",
        ]);
        match load_script(host).unwrap() {
            LoadOutcome::ConstructorFailed(e) => assert!(e.to_string().contains("ctor boom")),
            _ => panic!("expected ConstructorFailed"),
        }
    }

    #[test]
    fn loads_and_drives_an_instance() {
        let host = host_with(&[
            r#"
            local class, env = sketch.declare("Main")
            local body = function()
                function setup()
                    frame_rate = 30
                end
                function draw()
                    seen_time = real_time
                    circle(10, 20, 4)
                end
            end
            setfenv(body, env)
            body()
            "#,
            WRAPPER,
        ]);

        let mut instance = match load_script(host).unwrap() {
            LoadOutcome::Loaded(i) => i,
            _ => panic!("expected Loaded"),
        };
        assert_eq!(instance.class_name(), "Main");
        assert_eq!(instance.frame_rate().unwrap(), 0);

        instance.setup().unwrap();
        assert_eq!(instance.frame_rate().unwrap(), 30);

        instance.bind_surface(Surface::new()).unwrap();
        instance.set_real_time(1.5).unwrap();
        instance.draw().unwrap();
        instance.frame_advanced().unwrap();

        assert_eq!(
            instance.surface_ops().unwrap(),
            vec![DrawOp::Ellipse { x: 10.0, y: 20.0, w: 4.0, h: 4.0 }]
        );
        let surface = instance.take_surface().unwrap().unwrap();
        assert_eq!(surface.ops.len(), 1);
        assert!(instance.surface_ops().unwrap().is_empty());
    }

    #[test]
    fn default_entry_points_are_no_ops() {
        let host = host_with(&[WRAPPER]);
        let instance = match load_script(host).unwrap() {
            LoadOutcome::Loaded(i) => i,
            _ => panic!("expected Loaded"),
        };
        instance.setup().unwrap();
        instance.draw().unwrap();
    }
}
