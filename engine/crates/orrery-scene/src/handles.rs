use slotmap::new_key_type;

new_key_type! { pub struct MeshHandle; }
new_key_type! { pub struct MaterialHandle; }
new_key_type! { pub struct ObjectHandle; }
