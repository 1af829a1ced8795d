use dose_volume::{
    aligner,
    builder::VolumeBuilder,
    enums::{AlignMode, Orientation, Reduction},
    mask, meta_image, reducer,
    volume::Window,
};

fn main() {
    let slices =
        VolumeBuilder::from_directory("dicom").expect("should have read slices from directory");
    let ct = VolumeBuilder::build(slices).expect("should have built the volume");
    println!("CT volume {:?}, spacing {:?} mm", ct.dim(), ct.spacing());

    let bone = mask::threshold(&ct, 200.0);
    println!("bone voxels: {}", bone.count());

    let dose = meta_image::read("output/total_dose.mhd")
        .expect("should have read the scored dose field");
    let dose = aligner::align(&dose, &ct.geometry(), AlignMode::ExactGrid)
        .expect("dose should be scored on the CT grid");

    let total = reducer::reduce(&dose, &bone, Reduction::Sum)
        .expect("should have summed dose over the bone mask");
    let mean = reducer::reduce(&dose, &bone, Reduction::Mean)
        .expect("should have averaged dose over the bone mask");
    let peak = reducer::reduce(&dose, &bone, Reduction::Max)
        .expect("should have found the peak dose in the bone mask");
    println!("total dose to bone: {total:.5e} Gy");
    println!("mean dose to bone:  {mean:.5e} Gy");
    println!("max dose in bone:   {peak:.5e} Gy");
    println!("max dose anywhere:  {:.5e} Gy", reducer::field_max(&dose));

    let image = ct
        .slice_image(ct.dim().0 / 2, Orientation::Axial, Window::full_range(&ct))
        .expect("should have rendered the central axial slice");
    image
        .save("result.png")
        .expect("should have saved the slice image");
}
